#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex,
    };
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex,
    };
}

pub(crate) use imp::*;
