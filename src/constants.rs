use std::time::Duration;

pub(crate) const MAC_ADDR_LEN: u8 = 6;
pub(crate) const IP_V4_LEN: u8 = 4;

pub(crate) const ARP_PACK_LEN: usize = 28;
pub(crate) const ETH_HEADER_LEN: usize = 14;
pub(crate) const ETH_PACK_LEN: usize = ETH_HEADER_LEN + ARP_PACK_LEN;
// large enough for any untagged frame the capture may hand us
pub(crate) const MAX_FRAME_LEN: usize = 1518;

pub(crate) const ICMP_ECHO_HEADER_LEN: usize = 8;
pub(crate) const ICMP_READ_BUF_LEN: usize = 1500;
pub(crate) const ICMP_ECHO_SEQUENCE: u16 = 1;

pub const DEFAULT_ARP_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_ICMP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ICMP_READ_TIMEOUT: Duration = Duration::from_secs(10);
