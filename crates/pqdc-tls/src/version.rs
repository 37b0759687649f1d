use std::fmt;

/// Protocol versions a [`Config`](crate::Config) may bound. Ordered so the
/// highest common version can be picked with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 4] = [
        ProtocolVersion::Tls10,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls12,
        ProtocolVersion::Tls13,
    ];

    pub fn wire(self) -> u16 {
        match self {
            ProtocolVersion::Tls10 => 0x0301,
            ProtocolVersion::Tls11 => 0x0302,
            ProtocolVersion::Tls12 => 0x0303,
            ProtocolVersion::Tls13 => 0x0304,
        }
    }

    pub fn from_wire(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|version| version.wire() == value)
    }

    /// Every version in `min..=max`, lowest first. Empty when the bounds are
    /// inverted.
    pub fn range(min: Self, max: Self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|version| *version >= min && *version <= max)
            .collect()
    }

    /// Pick the highest version that appears in `offered` and lies inside the
    /// local bounds. Unknown wire values are ignored.
    pub fn negotiate(offered: &[u16], min: Self, max: Self) -> Option<Self> {
        offered
            .iter()
            .filter_map(|wire| Self::from_wire(*wire))
            .filter(|version| *version >= min && *version <= max)
            .max()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProtocolVersion::Tls10 => "TLS 1.0",
            ProtocolVersion::Tls11 => "TLS 1.1",
            ProtocolVersion::Tls12 => "TLS 1.2",
            ProtocolVersion::Tls13 => "TLS 1.3",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_highest_common_version() {
        let offered: Vec<u16> = ProtocolVersion::range(ProtocolVersion::Tls10, ProtocolVersion::Tls13)
            .into_iter()
            .map(ProtocolVersion::wire)
            .collect();
        assert_eq!(
            ProtocolVersion::negotiate(&offered, ProtocolVersion::Tls10, ProtocolVersion::Tls12),
            Some(ProtocolVersion::Tls12)
        );
        assert_eq!(
            ProtocolVersion::negotiate(&offered, ProtocolVersion::Tls10, ProtocolVersion::Tls13),
            Some(ProtocolVersion::Tls13)
        );
    }

    #[test]
    fn disjoint_ranges_have_no_common_version() {
        let offered = [ProtocolVersion::Tls10.wire(), ProtocolVersion::Tls11.wire(), 0x7f1c];
        assert_eq!(
            ProtocolVersion::negotiate(&offered, ProtocolVersion::Tls12, ProtocolVersion::Tls13),
            None
        );
        assert!(ProtocolVersion::range(ProtocolVersion::Tls13, ProtocolVersion::Tls10).is_empty());
    }
}
