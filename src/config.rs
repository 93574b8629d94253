use crate::channel::{UnderlyingChannel, Worker};
use crate::crypto::{DtlsIdentity, EngineFactory, Fingerprint, OsslEngineFactory, SrtpProfile};
use crate::error::Error;
use crate::fifo::DEFAULT_FIFO_CAPACITY;
use crate::role::DtlsRole;
use crate::transport::DtlsTransport;

/// Customized config for a [`DtlsTransport`].
///
/// ```no_run
/// # use dtls_transport::{DtlsConfig, DtlsIdentity, DtlsRole, SrtpProfile};
/// # fn channel() -> Box<dyn dtls_transport::UnderlyingChannel> { unimplemented!() }
/// let identity = DtlsIdentity::generate().unwrap();
///
/// let transport = DtlsConfig::new()
///     .set_role(DtlsRole::Server)
///     .set_srtp_profiles(&[SrtpProfile::Aes128CmSha1_80])
///     .set_local_identity(identity)
///     .build(channel())
///     .unwrap();
/// ```
///
/// Configs implement [`Clone`] to help create multiple transports with the
/// same identity.
#[derive(Debug, Clone)]
pub struct DtlsConfig {
    pub(crate) role: Option<DtlsRole>,
    pub(crate) srtp_profiles: Vec<SrtpProfile>,
    pub(crate) local_identity: Option<DtlsIdentity>,
    pub(crate) remote_fingerprint: Option<Fingerprint>,
    pub(crate) fifo_capacity: usize,
}

impl DtlsConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        DtlsConfig::default()
    }

    /// The DTLS role, if set. Defaults to [`DtlsRole::Client`].
    pub fn role(&self) -> Option<DtlsRole> {
        self.role
    }

    /// Sets the DTLS role, typically from [`negotiate_role`][crate::negotiate_role].
    pub fn set_role(mut self, role: DtlsRole) -> Self {
        self.role = Some(role);
        self
    }

    /// SRTP profiles to offer, most preferred first.
    pub fn srtp_profiles(&self) -> &[SrtpProfile] {
        &self.srtp_profiles
    }

    /// Sets the SRTP profiles to offer in the handshake.
    ///
    /// With no profiles, the bypass path for SRTP is disabled.
    pub fn set_srtp_profiles(mut self, profiles: &[SrtpProfile]) -> Self {
        self.srtp_profiles = profiles.to_vec();
        self
    }

    /// The local identity, if set.
    pub fn local_identity(&self) -> Option<&DtlsIdentity> {
        self.local_identity.as_ref()
    }

    /// Sets the local identity.
    pub fn set_local_identity(mut self, identity: DtlsIdentity) -> Self {
        self.local_identity = Some(identity);
        self
    }

    /// The fingerprint the remote certificate must match, if set.
    pub fn remote_fingerprint(&self) -> Option<&Fingerprint> {
        self.remote_fingerprint.as_ref()
    }

    /// Sets the remote fingerprint, as signalled by the peer.
    ///
    /// An empty fingerprint means the peer declined DTLS.
    pub fn set_remote_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.remote_fingerprint = Some(fingerprint);
        self
    }

    /// Max bytes of DTLS records buffered between arrival and the record engine.
    pub fn fifo_capacity(&self) -> usize {
        self.fifo_capacity
    }

    /// Sets the capacity of the incoming DTLS record buffer.
    ///
    /// Defaults to 8192 bytes.
    pub fn set_fifo_capacity(mut self, capacity: usize) -> Self {
        self.fifo_capacity = capacity;
        self
    }

    /// Creates a transport over `channel` using the OpenSSL record engine.
    pub fn build<C: UnderlyingChannel>(self, channel: C) -> Result<DtlsTransport<C>, Error> {
        self.build_with_factory(channel, OsslEngineFactory)
    }

    /// Creates a transport over `channel` with engines from `factory`.
    pub fn build_with_factory<C, F>(self, channel: C, factory: F) -> Result<DtlsTransport<C>, Error>
    where
        C: UnderlyingChannel,
        F: EngineFactory + 'static,
    {
        let mut transport = DtlsTransport::with_engine_factory(
            channel,
            Worker::current(),
            Box::new(factory),
            self.fifo_capacity,
        );
        transport.configure(self)?;
        Ok(transport)
    }
}

impl Default for DtlsConfig {
    fn default() -> Self {
        Self {
            role: None,
            srtp_profiles: vec![],
            local_identity: None,
            remote_fingerprint: None,
            fifo_capacity: DEFAULT_FIFO_CAPACITY,
        }
    }
}
