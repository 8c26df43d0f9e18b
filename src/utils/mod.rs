pub(crate) mod atomic_float;
