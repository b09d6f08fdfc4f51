//! Identities of shared objects: memory locations and mutexes.

use core::fmt::Debug;
use std::fmt::Display;
use std::hash::Hash;

use dyn_clone::DynClone;
use dyn_eq::DynEq;
use dyn_hash::DynHash;

/// Identity of a shared object observed by the instrumentation. Any
/// `Eq + Clone + Hash + Debug + Send` type qualifies automatically.
pub trait Identifier: DynEq + DynClone + DynHash + Debug + Send {}
dyn_clone::clone_trait_object!(Identifier);
dyn_eq::eq_trait_object!(Identifier);
dyn_hash::hash_trait_object!(Identifier);

impl<T: Eq + Clone + Hash + Debug + Send + 'static> Identifier for T {}

/// A memory location or mutex identity.
///
/// Identities are only stable within one run of the program under test;
/// across runs they are rewritten through the label replay operation.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Loc(Box<dyn Identifier>);

impl Loc {
    pub fn new<T: Identifier>(id: T) -> Self {
        Loc(Box::new(id))
    }
}

impl Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
