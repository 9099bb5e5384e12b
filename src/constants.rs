pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const MAX_HEADER_BLOCK_SIZE: usize = 8 * 1024;
pub(crate) const BUFFER_HIGH_WATER: usize = 64 * 1024;

/// List indices above this are stored as map keys instead.
pub(crate) const MAX_LIST_INDEX: usize = 1024;

/// Field names nesting deeper than this many brackets are kept as flat keys.
pub(crate) const MAX_DEPTH: usize = 32;

pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

pub(crate) const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";
pub(crate) const DEFAULT_TRANSFER_ENCODING: &str = "7bit";
pub(crate) const DEFAULT_MIME_TYPE: &str = "text/plain";
pub(crate) const DEFAULT_CHARSET: &str = "utf-8";

pub(crate) const URLENCODED_PAIR_SEPARATOR: u8 = b'&';
