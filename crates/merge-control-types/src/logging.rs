// Logging macros shared by every crate in the workspace.
// All messages go through the `log` facade under the `merge_control` target.

#[macro_export]
macro_rules! sys_debug {
    ($($arg:tt)*) => {
        $crate::__log::debug!(target: "merge_control", $($arg)*)
    };
}

#[macro_export]
macro_rules! sys_info {
    ($($arg:tt)*) => {
        $crate::__log::info!(target: "merge_control", $($arg)*)
    };
}

#[macro_export]
macro_rules! sys_warn {
    ($($arg:tt)*) => {
        $crate::__log::warn!(target: "merge_control", $($arg)*)
    };
}

#[macro_export]
macro_rules! sys_error {
    ($($arg:tt)*) => {
        $crate::__log::error!(target: "merge_control", $($arg)*)
    };
}
