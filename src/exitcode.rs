//! Process exit codes, following BSD sysexits.h

/// Bad command line: unknown flags, missing command, config already present
pub const USAGE: i32 = 64;

/// Malformed bundle manifest or unloadable page document
pub const DATAERR: i32 = 65;

/// Bundle directory or manifest not found
pub const NOINPUT: i32 = 66;

/// Engine failure that is not the input's fault
pub const SOFTWARE: i32 = 70;

/// Reading the bundle or writing pruned output failed
pub const IOERR: i32 = 74;

/// Unreadable or invalid settings file
pub const CONFIG: i32 = 78;
