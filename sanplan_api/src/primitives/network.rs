use std::net::Ipv4Addr;

/// Splits `a.b.c.d/bits` into the address and prefix length.
pub fn parse_cidr(text: &str) -> Option<(Ipv4Addr, u8)> {
    let (address, bits) = text.trim().split_once('/')?;
    let address = address.trim().parse().ok()?;
    let bits: u8 = bits.trim().parse().ok()?;
    (bits <= 32).then_some((address, bits))
}

pub fn prefix_to_netmask(bits: u8) -> Ipv4Addr {
    match bits {
        0 => Ipv4Addr::new(0, 0, 0, 0),
        1..=32 => Ipv4Addr::from(u32::MAX << (32 - u32::from(bits))),
        _ => Ipv4Addr::new(255, 255, 255, 255),
    }
}

/// Prefix length of a dotted-quad netmask. Non-contiguous masks yield `None`.
pub fn netmask_to_prefix(mask: Ipv4Addr) -> Option<u8> {
    let value = u32::from(mask);
    let bits = value.leading_ones();
    (value.checked_shl(bits).unwrap_or(0) == 0).then_some(bits as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        assert_eq!(
            parse_cidr("10.1.2.0/24"),
            Some((Ipv4Addr::new(10, 1, 2, 0), 24))
        );
        assert_eq!(parse_cidr("10.1.2.0"), None);
        assert_eq!(parse_cidr("10.1.2.0/33"), None);
        assert_eq!(parse_cidr("ten/8"), None);
    }

    #[test]
    fn test_masks() {
        assert_eq!(prefix_to_netmask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_to_netmask(31), Ipv4Addr::new(255, 255, 255, 254));
        assert_eq!(prefix_to_netmask(32), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(prefix_to_netmask(0), Ipv4Addr::new(0, 0, 0, 0));

        assert_eq!(netmask_to_prefix(Ipv4Addr::new(255, 255, 252, 0)), Some(22));
        assert_eq!(netmask_to_prefix(Ipv4Addr::new(255, 255, 255, 255)), Some(32));
        assert_eq!(netmask_to_prefix(Ipv4Addr::new(0, 0, 0, 0)), Some(0));
        assert_eq!(netmask_to_prefix(Ipv4Addr::new(255, 0, 255, 0)), None);
    }
}
