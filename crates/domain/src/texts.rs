//! Fixed user-facing replies.

pub const TRANSPORT_ERROR: &str = "An unknown error occurred, I'm sorry.";
pub const SERVER_ERROR: &str = "The server could not handle this request.";

pub const EMPTY_COMMAND: &str =
    "I recognized this command, but the server returned an empty message.";
pub const EMPTY_SENTENCE: &str =
    "I understood what you said, but the server returned an empty message.";
pub const EMPTY_CONVERSE: &str =
    "I sent back your response, but the server returned an empty message.";

pub const DISCONNECTED: &str =
    "I am disconnected from the brain. Please contact an administrator.";
pub const COULD_NOT_JOIN: &str = "I could not join the brain. Please try again later, and contact an administrator if this message shows up again.";

pub const HOOK_FAILED: &str = "The skill attempted to create a hook but an error occurred.";

pub const NOT_ADMIN: &str = "You are not an administrator.";
