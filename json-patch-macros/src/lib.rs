//! Small builders for RFC 6902 patches.
//!
//! ```ignore
//! let patch = patch![
//!     test!(["spec", "replicas"] => 2),
//!     put!(["spec", "replicas"] => 3),
//! ];
//! ```

#[macro_export]
macro_rules! path {
    () => {
        ::json_patch::jsonptr::PointerBuf::root()
    };
    ($($token:expr),*$(,)?) => {
        ::json_patch::jsonptr::PointerBuf::from_tokens([
            $(::json_patch::jsonptr::Token::from($token)),*
        ])
    };
}

#[macro_export]
macro_rules! add {
    ([$($path:expr),*$(,)?] => $($json:tt)*) => {
        ::json_patch::PatchOperation::Add(
            ::json_patch::AddOperation {
                path: $crate::path!($($path),*),
                value: ::serde_json::json!($($json)*),
            }
        )
    };
}

#[macro_export]
macro_rules! rm {
    ([$($path:expr),*$(,)?]) => {
        ::json_patch::PatchOperation::Remove(
            ::json_patch::RemoveOperation {
                path: $crate::path!($($path),*),
            }
        )
    };
}

#[macro_export]
macro_rules! put {
    ([$($path:expr),*$(,)?] => $($json:tt)*) => {
        ::json_patch::PatchOperation::Replace(
            ::json_patch::ReplaceOperation {
                path: $crate::path!($($path),*),
                value: ::serde_json::json!($($json)*),
            }
        )
    };
}

/// Guards the rest of the patch: the server rejects the whole patch when the
/// value at `path` differs.
#[macro_export]
macro_rules! test {
    ([$($path:expr),*$(,)?] => $($json:tt)*) => {
        ::json_patch::PatchOperation::Test(
            ::json_patch::TestOperation {
                path: $crate::path!($($path),*),
                value: ::serde_json::json!($($json)*),
            }
        )
    };
}

#[macro_export]
macro_rules! patch {
    ($($op:expr),*$(,)?) => {
        ::json_patch::Patch(vec![$($op),*])
    };
}
