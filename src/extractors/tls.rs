use crate::packet::Packet;

/// TLS handshake details accumulated for one direction of a flow.
///
/// Zero-initializable: a record with no TLS traffic keeps every field at its
/// default and is omitted from emission entirely (`include_tls`).
#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    pub version: Option<u16>,
    pub client_key_length: Option<u32>,
    pub random: Option<[u8; 32]>,
    pub num_ciphersuites: Option<u16>,
    pub sni: Option<String>,
}

/// Drives [`TlsInfo`] from the raw TLS record bytes of each packet. The real
/// handshake parser (ClientHello/ServerHello extraction) is an external
/// collaborator; this trait is the seam it plugs into.
pub trait TlsExtractor {
    fn update(&self, state: &mut TlsInfo, pkt: &Packet);
}

/// No-op extractor used when TLS tracking is enabled in config but no parser has
/// been wired in; leaves every record's `tls` sub-record at its default.
#[derive(Debug, Default)]
pub struct NoopTlsExtractor;

impl TlsExtractor for NoopTlsExtractor {
    fn update(&self, _state: &mut TlsInfo, _pkt: &Packet) {}
}
