//! Protocol return codes.
//!
//! Values follow the OneBot 12 retcode taxonomy. `1xxxx` codes are request
//! errors reported to the caller before a handler runs; `2xxxx` codes are
//! execution errors produced while running a handler.

/// The action succeeded.
pub const OK: i64 = 0;

/// The request body could not be parsed as an action request.
pub const BAD_REQUEST: i64 = 10001;

/// The requested action is not registered.
pub const UNSUPPORTED_ACTION: i64 = 10002;

/// A required parameter is missing or a parameter has the wrong type.
pub const BAD_PARAM: i64 = 10003;

/// The request carries a parameter the action does not declare.
pub const UNSUPPORTED_PARAM: i64 = 10004;

/// The message contains a segment type the implementation does not support.
pub const UNSUPPORTED_SEGMENT: i64 = 10005;

/// A message segment carries malformed data.
pub const BAD_SEGMENT_DATA: i64 = 10006;

/// A message segment carries data the implementation does not support.
pub const UNSUPPORTED_SEGMENT_DATA: i64 = 10007;

/// Several bots are registered and the request names none of them.
pub const WHO_AM_I: i64 = 10101;

/// The requested bot selector matches no registered bot.
pub const UNKNOWN_SELF: i64 = 10102;

/// The registered handler is unusable.
pub const BAD_HANDLER: i64 = 20001;

/// The handler failed with an error it did not map to a retcode.
pub const INTERNAL_HANDLER_ERROR: i64 = 20002;
