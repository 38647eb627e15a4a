pub mod cseq;
pub mod header;
pub mod message;
pub mod method;
pub mod status;
pub mod via;

pub use cseq::CSeq;
pub use header::Header;
pub use message::{HasHeaders, Message, Request, Response, SIP_VERSION};
pub use method::Method;
pub use status::StatusCode;
pub use via::{Via, BRANCH_MAGIC_COOKIE};
