//! Request envelope parsing.
//!
//! A request is one UTF-8 XML document. All routing information lives on the
//! root element: `Version` (optional), `Platform` (required), `JobType`
//! (required for V2+). The element body is opaque to the server and handed
//! unmodified to the compile backend.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ProtocolError;
use crate::version::ProtocolVersion;

/// A parsed compile-farm request.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    root: String,
    version_attr: Option<String>,
    platform: Option<String>,
    job_type: Option<String>,
    raw: Vec<u8>,
}

impl CompileRequest {
    /// Parse raw request bytes into an envelope.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::ParseXml(format!("not valid UTF-8: {e}")))?;

        let mut reader = Reader::from_str(text);
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let root = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let mut version_attr = None;
                    let mut platform = None;
                    let mut job_type = None;

                    for attr in e.attributes() {
                        let attr =
                            attr.map_err(|e| ProtocolError::ParseXml(e.to_string()))?;
                        let value = attr
                            .unescape_value()
                            .map_err(|e| ProtocolError::ParseXml(e.to_string()))?
                            .into_owned();
                        match attr.key.as_ref() {
                            b"Version" => version_attr = Some(value),
                            b"Platform" => platform = Some(value),
                            b"JobType" => job_type = Some(value),
                            _ => {}
                        }
                    }

                    return Ok(Self {
                        root,
                        version_attr,
                        platform,
                        job_type,
                        raw: bytes.to_vec(),
                    });
                }
                Ok(Event::Eof) => return Err(ProtocolError::NoRootElement),
                Ok(_) => continue,
                Err(e) => return Err(ProtocolError::ParseXml(e.to_string())),
            }
        }
    }

    /// Name of the root element.
    pub fn root_element(&self) -> &str {
        &self.root
    }

    /// Negotiated protocol version. Absent or unrecognized `Version`
    /// attributes resolve to V1.
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::from_attr(self.version_attr.as_deref())
    }

    /// The raw `Version` attribute, if the client sent one.
    pub fn version_attr(&self) -> Option<&str> {
        self.version_attr.as_deref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// `Platform` is required on every request.
    pub fn require_platform(&self) -> Result<&str, ProtocolError> {
        self.platform.as_deref().ok_or(ProtocolError::MissingPlatform)
    }

    pub fn job_type(&self) -> Option<&str> {
        self.job_type.as_deref()
    }

    /// `JobType` is required once the client speaks V2+.
    pub fn require_job_type(&self) -> Result<&str, ProtocolError> {
        self.job_type.as_deref().ok_or(ProtocolError::MissingJobType)
    }

    /// The unmodified request bytes, as given to compile backends.
    pub fn raw_xml(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_request() {
        let xml = br#"<Request Version="2.2" Platform="DX11" JobType="Compile">data</Request>"#;
        let req = CompileRequest::parse(xml).unwrap();
        assert_eq!(req.root_element(), "Request");
        assert_eq!(req.version(), ProtocolVersion::V2_2);
        assert_eq!(req.platform(), Some("DX11"));
        assert_eq!(req.job_type(), Some("Compile"));
        assert_eq!(req.raw_xml(), xml);
    }

    #[test]
    fn test_parse_self_closing_root() {
        let xml = br#"<Compile Platform="ORBIS"/>"#;
        let req = CompileRequest::parse(xml).unwrap();
        assert_eq!(req.root_element(), "Compile");
        assert_eq!(req.platform(), Some("ORBIS"));
        assert_eq!(req.version(), ProtocolVersion::V1);
    }

    #[test]
    fn test_parse_skips_declaration() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><Request Platform="GL4"/>"#;
        let req = CompileRequest::parse(xml).unwrap();
        assert_eq!(req.platform(), Some("GL4"));
    }

    #[test]
    fn test_malformed_xml() {
        let err = CompileRequest::parse(b"<Request Platform=").unwrap_err();
        assert!(err.to_string().contains("failed to parse request XML"));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = CompileRequest::parse(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.to_string().contains("failed to parse request XML"));
    }

    #[test]
    fn test_no_root_element() {
        let err = CompileRequest::parse(b"   ").unwrap_err();
        assert!(matches!(err, ProtocolError::NoRootElement));
    }

    #[test]
    fn test_missing_platform() {
        let req = CompileRequest::parse(br#"<Request Version="2.0" JobType="Compile"/>"#).unwrap();
        assert!(matches!(
            req.require_platform(),
            Err(ProtocolError::MissingPlatform)
        ));
    }

    #[test]
    fn test_missing_job_type() {
        let req = CompileRequest::parse(br#"<Request Version="2.0" Platform="DX11"/>"#).unwrap();
        assert!(matches!(
            req.require_job_type(),
            Err(ProtocolError::MissingJobType)
        ));
    }

    #[test]
    fn test_unknown_attributes_ignored() {
        let req =
            CompileRequest::parse(br#"<Request Platform="DX11" Priority="high"/>"#).unwrap();
        assert_eq!(req.platform(), Some("DX11"));
        assert_eq!(req.job_type(), None);
    }
}
