//! Assertion macros shared by integration tests.

/// Await a future yielding an `Option` and panic with the call site if it
/// yields `None`.
#[macro_export]
macro_rules! recv_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("nothing received at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

pub use crate::recv_expect;
