//! Values carried by memory accesses.

use core::fmt::Debug;
use std::any::type_name;
use std::hash::Hash;

use dyn_clone::DynClone;
use dyn_eq::DynEq;
use dyn_hash::DynHash;

/// Supertrait satisfied by all values flowing through reads and writes.
/// Any `Eq + Clone + Hash + Debug + Send` type qualifies automatically.
pub trait Value: DynEq + DynClone + DynHash + Debug + Send {}
dyn_clone::clone_trait_object!(Value);
dyn_eq::eq_trait_object!(Value);
dyn_hash::hash_trait_object!(Value);

impl<T: Eq + Clone + Hash + Debug + Send + 'static> Value for T {}

/// A dynamically typed value stored at a memory location.
///
/// The engine does not know the types a program under test stores in its
/// fields, so values are boxed behind the [`Value`] trait. The recorded
/// type name is kept for diagnostics only; equality and hashing go
/// through the boxed value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Val {
    val: Box<dyn Value>,
    type_name: String,
}

impl Val {
    pub fn new<T: Value + 'static>(val: T) -> Self {
        Val {
            val: Box::new(val),
            type_name: type_name::<T>().to_string(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.val)
    }
}

/// The class of a memory cell: the type it holds together with the value
/// an unwritten location of that class reads as.
///
/// Classes compare by type name; the default is what the initialization
/// event supplies to first reads.
#[derive(Clone, Debug)]
pub struct ValueClass {
    type_name: String,
    default: Val,
}

impl ValueClass {
    pub fn of<T: Value + Default + 'static>() -> Self {
        ValueClass {
            type_name: type_name::<T>().to_string(),
            default: Val::new(T::default()),
        }
    }

    pub fn default_value(&self) -> Val {
        self.default.clone()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl PartialEq for ValueClass {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for ValueClass {}

impl std::fmt::Display for ValueClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_compare_through_the_box() {
        assert_eq!(Val::new(42), Val::new(42));
        assert_ne!(Val::new(42), Val::new(17));
        assert_ne!(Val::new(42i64), Val::new(42u64));
        assert_eq!(Val::new("x".to_string()), Val::new("x".to_string()));
    }

    #[test]
    fn values_hash_through_the_box() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Val::new(1i32));
        set.insert(Val::new(1i32));
        set.insert(Val::new(2i32));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn class_supplies_its_default() {
        let c = ValueClass::of::<i32>();
        assert_eq!(c.default_value(), Val::new(0i32));
        assert_eq!(c, ValueClass::of::<i32>());
        assert_ne!(c, ValueClass::of::<bool>());
    }

    #[test]
    fn clone_is_independent() {
        let a = Val::new(7u8);
        let b = a.clone();
        assert_eq!(a, b);
    }
}
