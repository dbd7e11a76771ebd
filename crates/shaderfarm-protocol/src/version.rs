//! Protocol version negotiation.
//!
//! Clients declare their capability level through the `Version` attribute on
//! the request root element. Legacy clients send no attribute at all and are
//! served through the single-job-type compile path.

/// Client capability level, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// Legacy clients: no `Version` attribute, single compile job type.
    V1,
    /// `Version="2.0"`: explicit `JobType` dispatch.
    V2,
    /// `Version="2.1"`: adds the ready-token handshake before dispatch.
    V2_1,
    /// `Version="2.2"`: current.
    V2_2,
}

impl ProtocolVersion {
    /// Map the `Version` attribute to a capability level.
    ///
    /// Anything absent or unrecognized falls back to [`ProtocolVersion::V1`].
    /// Deployed legacy clients rely on this, so an unparseable version string
    /// is never rejected.
    pub fn from_attr(attr: Option<&str>) -> Self {
        match attr {
            Some("2.2") => ProtocolVersion::V2_2,
            Some("2.1") => ProtocolVersion::V2_1,
            Some("2.0") => ProtocolVersion::V2,
            _ => ProtocolVersion::V1,
        }
    }

    /// V2+ requests must carry an explicit `JobType` attribute.
    pub fn requires_job_type(self) -> bool {
        self >= ProtocolVersion::V2
    }

    /// V2.1+ clients send a ready token before the job executes.
    pub fn has_ready_handshake(self) -> bool {
        self >= ProtocolVersion::V2_1
    }

    /// V2+ responses carry a leading job-state code byte.
    pub fn frames_job_state(self) -> bool {
        self >= ProtocolVersion::V2
    }

    /// Wire form of the version, as clients send it.
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "1.0",
            ProtocolVersion::V2 => "2.0",
            ProtocolVersion::V2_1 => "2.1",
            ProtocolVersion::V2_2 => "2.2",
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_versions_map() {
        assert_eq!(ProtocolVersion::from_attr(Some("2.2")), ProtocolVersion::V2_2);
        assert_eq!(ProtocolVersion::from_attr(Some("2.1")), ProtocolVersion::V2_1);
        assert_eq!(ProtocolVersion::from_attr(Some("2.0")), ProtocolVersion::V2);
    }

    #[test]
    fn test_absent_version_is_legacy() {
        assert_eq!(ProtocolVersion::from_attr(None), ProtocolVersion::V1);
    }

    #[test]
    fn test_unparseable_version_falls_back_to_legacy() {
        // Deployed behavior: never reject an unknown version string.
        assert_eq!(ProtocolVersion::from_attr(Some("3.0")), ProtocolVersion::V1);
        assert_eq!(ProtocolVersion::from_attr(Some("garbage")), ProtocolVersion::V1);
        assert_eq!(ProtocolVersion::from_attr(Some("")), ProtocolVersion::V1);
    }

    #[test]
    fn test_capability_gates() {
        assert!(!ProtocolVersion::V1.requires_job_type());
        assert!(ProtocolVersion::V2.requires_job_type());
        assert!(!ProtocolVersion::V2.has_ready_handshake());
        assert!(ProtocolVersion::V2_1.has_ready_handshake());
        assert!(ProtocolVersion::V2_2.has_ready_handshake());
    }

    #[test]
    fn test_ordering() {
        assert!(ProtocolVersion::V1 < ProtocolVersion::V2);
        assert!(ProtocolVersion::V2 < ProtocolVersion::V2_1);
        assert!(ProtocolVersion::V2_1 < ProtocolVersion::V2_2);
    }
}
