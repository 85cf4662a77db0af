//! Non-blocking TCP primitives.
//!
//! - [`socket`]: [`Socket`], the move-only owner of a non-blocking fd
//! - [`future`]: the accept/connect/read/write futures it hands out
//!
//! # Example
//!
//! ```ignore
//! use evio::{Address, Loop, PollPoller, Socket};
//!
//! let mut lp = Loop::<PollPoller>::new()?;
//! let poller = lp.poller();
//! lp.spawn(async move {
//!     let server = Socket::new(Address::new("127.0.0.1", 8080)?, &poller)?;
//!     server.bind()?;
//!     server.listen()?;
//!     let client = server.accept().await?;
//!     Ok::<_, evio::Error>(())
//! });
//! ```
//!
//! [`Socket`]: socket::Socket

pub mod future;
pub mod socket;
