/// Work requested by [`crate::update`]; executed by the engine's driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch page 1 and read the total page count from it.
    DiscoverPages,
    FetchPage { page: u32 },
    Pause(Pause),
    /// Every page up to `total_pages` has been decoded.
    Finished,
    /// The soft-failure ceiling was exceeded.
    GiveUp { page: u32, attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Short delay between successful network fetches.
    Polite,
    /// Hold before retrying a soft-failed step.
    Backoff { attempt: u32 },
}
