//! IPv4 socket addresses and their kernel representation.

use crate::error::{Error, Result};

use std::fmt;
use std::mem;
use std::net::Ipv4Addr;

/// An IPv4 socket address: a dotted-quad host plus a port.
///
/// Immutable after construction. [`sockaddr`](Self::sockaddr) lowers the
/// address to the kernel form used by `bind`/`connect`;
/// [`from_sockaddr`](Self::from_sockaddr) recovers an `Address` from the form
/// filled in by `accept` and `getsockname`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    ip: Ipv4Addr,
    port: u16,
}

impl Address {
    /// Parses a dotted-quad host and pairs it with a port.
    ///
    /// Invalid input fails with [`Error::InvalidAddress`] at construction;
    /// no I/O happens here.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let ip = host
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::InvalidAddress(format!("{host}:{port}")))?;

        Ok(Self { ip, port })
    }

    pub fn host(&self) -> String {
        self.ip.to_string()
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The kernel form of this address, in network byte order.
    pub fn sockaddr(&self) -> libc::sockaddr_in {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        raw.sin_family = libc::AF_INET as libc::sa_family_t;
        raw.sin_port = self.port.to_be();
        raw.sin_addr = libc::in_addr {
            s_addr: u32::from(self.ip).to_be(),
        };

        raw
    }

    /// Recovers an address from the kernel form.
    pub fn from_sockaddr(raw: &libc::sockaddr_in) -> Self {
        Self {
            ip: Ipv4Addr::from(u32::from_be(raw.sin_addr.s_addr)),
            port: u16::from_be(raw.sin_port),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_dotted_quad() {
        assert!(Address::new("localhost", 80).is_err());
        assert!(Address::new("256.0.0.1", 80).is_err());
        assert!(Address::new("", 80).is_err());
    }

    #[test]
    fn display_is_host_colon_port() {
        let addr = Address::new("10.1.2.3", 4242).unwrap();
        assert_eq!(addr.to_string(), "10.1.2.3:4242");
    }
}
