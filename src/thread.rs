//! Thread identities of a recorded execution.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize, Serializer};

/// A unique identifier for a recorded thread.
///
/// Thread ids are opaque: the engine only relies on them being stable
/// within one recorded execution. The derived ordering (by numeric id)
/// exists so the checker can iterate threads deterministically and so
/// thread sets inside barrier labels can live in `BTreeSet`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ThreadId {
    opaque_id: u32,
}

impl Serialize for ThreadId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("t{}", self.opaque_id))
    }
}

impl Display for ThreadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!("t{}", self.opaque_id))
    }
}

pub struct ThreadIdFromStrError {
    msg: String,
}

impl Display for ThreadIdFromStrError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.msg)
    }
}

impl TryFrom<String> for ThreadId {
    type Error = ThreadIdFromStrError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if let Some(num) = s.strip_prefix('t') {
            match num.parse::<u32>() {
                Ok(tid) => Ok(ThreadId { opaque_id: tid }),
                Err(_) => Err(ThreadIdFromStrError {
                    msg: format!("Can't parse {} as a number", &s),
                }),
            }
        } else {
            Err(ThreadIdFromStrError {
                msg: format!("`{}` should begin with `t`", &s),
            })
        }
    }
}

/// Construct a `ThreadId` from a numeric id.
///
/// The numeric id must match the id the instrumentation reported when the
/// execution was recorded; the engine never invents ids of its own.
pub fn construct_thread_id(numeric_id: u32) -> ThreadId {
    ThreadId {
        opaque_id: numeric_id,
    }
}

/// The id of the main thread of every recorded execution.
pub fn main_thread_id() -> ThreadId {
    ThreadId { opaque_id: 0 }
}

/// Reserved pseudo-thread carrying the virtual initialization event. It
/// never appears in a thread sequence and must never index thread storage.
pub(crate) fn init_thread_id() -> ThreadId {
    ThreadId {
        opaque_id: u32::MAX,
    }
}

impl ThreadId {
    pub fn to_number(self) -> u32 {
        self.opaque_id
    }
}

impl From<ThreadId> for u32 {
    fn from(tid: ThreadId) -> Self {
        tid.opaque_id
    }
}

impl From<ThreadId> for usize {
    fn from(tid: ThreadId) -> Self {
        tid.opaque_id as usize
    }
}
