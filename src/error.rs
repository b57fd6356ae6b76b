use core::fmt;

/// Errors surfaced at the application boundary.
///
/// The protocol engine itself has no recoverable errors: malformed or
/// unexpected frames are always silently dropped per the filter table in
/// the packet filter design (see `debug::FilterStats`). The only place a
/// caller can hand us something we can't act on is `udp_send`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NetError {
    /// `payload.len()` would make the Ethernet frame exceed 1518 bytes.
    PayloadTooLarge { len: usize, max: usize },
    /// `udp_send` was called before `HostConfig` addresses were set.
    HostNotConfigured,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::PayloadTooLarge { len, max } => {
                write!(f, "UDP payload of {} bytes exceeds max {}", len, max)
            }
            NetError::HostNotConfigured => {
                write!(f, "host MAC/IP must be configured before udp_send")
            }
        }
    }
}
