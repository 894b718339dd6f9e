//! Append items to a podcast RSS feed kept as an XML file in Dropbox.
//!
//! The update reads the stored feed (or starts a new one when the file is
//! missing), puts the new items ahead of the existing ones, and writes the
//! document back through a chunked upload session.
//!
//! ```ignore
//! use castfeed::{update_feed, DropboxClient, StepInput, UpdateSettings};
//!
//! let store = DropboxClient::new(token);
//! let input = StepInput::from_json(&params)?;
//! let outcome = update_feed(&store, &input, &UpdateSettings::default()).await?;
//! println!("{}", outcome.url);
//! ```

pub mod config;
pub mod feed;
pub mod step;
pub mod storage;
pub mod updater;
pub mod util;

pub use config::Config;
pub use step::{InputError, StepInput};
pub use storage::{DropboxClient, ObjectStore, StorageError};
pub use updater::{update_feed, update_feed_at, UpdateError, UpdateOutcome, UpdateSettings};
