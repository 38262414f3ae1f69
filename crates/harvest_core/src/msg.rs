use crate::PageResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Begin a harvest.
    Start,
    /// The upstream reported how many pages the index has.
    TotalPagesKnown(u32),
    /// A page was fetched and decoded.
    PageDecoded {
        page: u32,
        result: PageResult,
        from_cache: bool,
    },
    /// The upstream answered, but the answer signals a failure worth retrying.
    SoftFailure { reason: String },
    /// The backoff pause requested by the last soft failure is over.
    BackoffElapsed,
}
