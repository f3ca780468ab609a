pub const ETHERNET_HEADER_LEN: usize = 14;
pub const ETHERNET_DST_OFFSET: usize = 0;
pub const ETHERNET_SRC_OFFSET: usize = 6;
pub const ETHERNET_TYPE_OFFSET: usize = 12;
pub const MAC_LEN: usize = 6;

/// Linux cooked capture (SLL): packet type, ARPHRD type, address length,
/// eight address bytes, then the ethertype.
pub const LINUX_SLL_HEADER_LEN: usize = 16;
pub const LINUX_SLL_ADDR_LEN_OFFSET: usize = 4;
pub const LINUX_SLL_ADDR_OFFSET: usize = 6;
pub const LINUX_SLL_PROTOCOL_OFFSET: usize = 14;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// ARP for IPv4 over Ethernet: 8 byte fixed header plus two MAC/IPv4 pairs.
pub const ARP_IPV4_LEN: usize = 28;
pub const ARP_OPCODE_OFFSET: usize = 6;
pub const ARP_SENDER_IP_OFFSET: usize = 14;
pub const ARP_TARGET_IP_OFFSET: usize = 24;

pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV4_TOTAL_LEN_OFFSET: usize = 2;
pub const IPV4_FRAGMENT_OFFSET: usize = 6;
pub const IPV4_FRAGMENT_OFFSET_MASK: u16 = 0x1fff;
pub const IPV4_TTL_OFFSET: usize = 8;
pub const IPV4_PROTOCOL_OFFSET: usize = 9;
pub const IPV4_SRC_OFFSET: usize = 12;
pub const IPV4_DST_OFFSET: usize = 16;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_ICMPV6: u8 = 58;

/// Source and destination port, big-endian, at the start of a UDP/TCP header.
pub const TRANSPORT_PORTS_LEN: usize = 4;
pub const UDP_HEADER_LEN: usize = 8;

pub const ICMPV4_TYPE_NAMES: &[(u8, &str)] = &[
    (0, "echo reply"),
    (3, "destination unreachable"),
    (4, "source quench"),
    (5, "redirect"),
    (8, "echo request"),
    (9, "router advertisement"),
    (10, "router solicitation"),
    (11, "time exceeded"),
    (12, "parameter problem"),
    (13, "timestamp"),
    (14, "timestamp reply"),
];

pub const ICMPV6_TYPE_NAMES: &[(u8, &str)] = &[
    (1, "destination unreachable"),
    (2, "packet too big"),
    (3, "time exceeded"),
    (4, "parameter problem"),
    (128, "echo request"),
    (129, "echo reply"),
    (133, "router solicitation"),
    (134, "router advertisement"),
    (135, "neighbor solicitation"),
    (136, "neighbor advertisement"),
    (137, "redirect"),
];
