/// Structural limits applied while decoding a body.
///
/// Every limit is unset by default, which means unbounded. Crossing the
/// part, file or field count, or receiving an over-long field name or value,
/// fails the whole parse. An oversized file is cut short and flagged as
/// [`truncated`](crate::FileRecord::truncated) instead.
///
/// # Examples
///
/// ```
/// use formstream::Limits;
///
/// let limits = Limits::new().fields(16).field_value_length(1024).file_size(10 * 1024 * 1024);
/// # drop(limits);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limits {
    pub(crate) parts: Option<u64>,
    pub(crate) files: Option<u64>,
    pub(crate) fields: Option<u64>,
    pub(crate) field_name_length: Option<usize>,
    pub(crate) field_value_length: Option<usize>,
    pub(crate) file_size: Option<u64>,
}

impl Limits {
    /// Creates limits with nothing bounded.
    pub fn new() -> Limits {
        Limits::default()
    }

    /// Sets the maximum number of parts, fields and files together.
    pub fn parts(mut self, limit: u64) -> Limits {
        self.parts = Some(limit);
        self
    }

    /// Sets the maximum number of file parts.
    pub fn files(mut self, limit: u64) -> Limits {
        self.files = Some(limit);
        self
    }

    /// Sets the maximum number of non-file fields.
    pub fn fields(mut self, limit: u64) -> Limits {
        self.fields = Some(limit);
        self
    }

    /// Sets the maximum field name length in bytes.
    pub fn field_name_length(mut self, limit: usize) -> Limits {
        self.field_name_length = Some(limit);
        self
    }

    /// Sets the maximum field value length in bytes.
    pub fn field_value_length(mut self, limit: usize) -> Limits {
        self.field_value_length = Some(limit);
        self
    }

    /// Sets the maximum size of a single file in bytes.
    pub fn file_size(mut self, limit: u64) -> Limits {
        self.file_size = Some(limit);
        self
    }

    pub(crate) fn exceeded(limit: Option<u64>, count: u64) -> bool {
        limit.map_or(false, |limit| count > limit)
    }
}
