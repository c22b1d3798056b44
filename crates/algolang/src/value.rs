//! Runtime values shared by the tree-walking interpreter and the bytecode VM.
//!
//! Using one `Value` type for both back ends is what makes Testable Property 1
//! ("interpreter and VM output are identical") checkable: there is only one
//! place that defines what a value looks like and how it prints.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::types::Type;

/// The shared, mutable backing store for one array value.
///
/// Arrays have reference semantics (`spec.md` §4.5): assigning an array
/// variable to another, or passing one as an argument, aliases the same
/// buffer. Only `VarDecl` execution allocates a fresh one.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// A runtime value.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Char(char),
    Str(String),
    #[serde(skip)]
    Array(ArrayRef),
    Void,
}

impl Value {
    #[must_use]
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Integer => Value::Int(0),
            Type::Boolean => Value::Bool(false),
            Type::Char => Value::Char('\0'),
            Type::String => Value::Str(String::new()),
            Type::Void => Value::Void,
            Type::Array { element, size } => {
                let elements = (0..*size).map(|_| Value::default_for(element)).collect();
                Value::Array(Rc::new(RefCell::new(elements)))
            }
            Type::Function { .. } => Value::Void,
        }
    }

    #[must_use]
    pub fn new_array(size: u32, element: &Type) -> ArrayRef {
        match Value::default_for(&Type::array(element.clone(), size)) {
            Value::Array(arr) => arr,
            _ => unreachable!("Type::Array always produces Value::Array"),
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Renders a value the way the `print` builtin does (`spec.md` §6).
    #[must_use]
    pub fn format(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Bool(true) => "истина".to_owned(),
            Value::Bool(false) => "ложь".to_owned(),
            Value::Char(c) => c.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(_) => "<массив>".to_owned(),
            Value::Void => String::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Structural equality used by `=`/`<>` on `{Integer, Boolean, Char}` and by
/// array-aliasing tests (`Rc::ptr_eq`) elsewhere; not derived on `Value`
/// itself because arrays don't have a sensible `PartialEq`.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_array_is_sized_and_filled() {
        let arr = Value::new_array(3, &Type::Integer);
        assert_eq!(arr.borrow().len(), 3);
        assert!(arr.borrow().iter().all(|v| matches!(v, Value::Int(0))));
    }

    #[test]
    fn array_clone_aliases_not_copies() {
        let arr = Value::new_array(2, &Type::Integer);
        let value = Value::Array(arr.clone());
        if let Value::Array(alias) = value.clone() {
            alias.borrow_mut()[0] = Value::Int(7);
        }
        assert_eq!(arr.borrow()[0].as_int(), Some(7));
    }

    #[test]
    fn bool_formats_as_source_language_words() {
        assert_eq!(Value::Bool(true).format(), "истина");
        assert_eq!(Value::Bool(false).format(), "ложь");
    }
}
