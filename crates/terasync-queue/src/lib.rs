//! # terasync-queue
//!
//! Download admission for TeraSync distribution servers:
//!
//! - [`RequestQueue`]: process-local table of download requests with a
//!   normal lane and a reserved priority lane
//! - [`AdmissionController`]: background loop promoting Queued requests and
//!   announcing each activation through a [`ReadyNotifier`]
//! - [`prepare_pull`]: resolves an Active request's blobs through the cache
//!   and streams them, completing the request when the stream ends
//!
//! [`ReadyNotifier`]: terasync_core::traits::ReadyNotifier

pub mod admission;
#[cfg(feature = "http-notifier")]
pub mod notifier;
pub mod pull;
pub mod queue;
pub mod state;

pub use admission::AdmissionController;
#[cfg(feature = "http-notifier")]
pub use notifier::HttpReadyNotifier;
pub use pull::{PullBatch, TrackedStream, prepare_pull};
pub use queue::{PullTicket, QueueLimits, QueueStats, RequestQueue};
pub use state::{DownloadRequest, Lane, RequestState};
