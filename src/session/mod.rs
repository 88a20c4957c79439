//! C9: the client and server session state machines (MS-NLMP 3.1/3.2), for both
//! NTLMv1 and NTLMv2. Modeled as a single tagged [`Session`] — the design notes call
//! this out explicitly as an alternative to four separate types sharing a capability
//! set; operations invalid for a session's [`Role`] return [`NtlmError::UnsupportedFeature`].

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::byte_helper::{random_array16, random_array8, windows_filetime_now};
use crate::crypto::{rc4, rc4_init, Rc4Handle};
use crate::derive::{
    compute_v1_responses, compute_v2_responses, exported_session_key_client, exported_session_key_server,
    kxkey_v1, kxkey_v1_extended, lmowfv1, lmowfv2, mac as mac_kernel, ntowfv1, ntowfv2, seal_key, session_base_key_v1,
    session_base_key_v2, sign_key, Party,
};
use crate::error::{NtlmError, NtlmResult};
use crate::flags::NegotiateFlags;
use crate::logging::{debug, warn};
use crate::messages::{AuthenticateMessage, ChallengeMessage, NegotiateMessage};
use crate::version::Version;

/// Which side of the handshake a [`Session`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// NTLM protocol version a session negotiates. Selects the §4.8 derivation formulas;
/// the surrounding state machine is otherwise identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmMode {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SentNegotiate,
    ReceivedNegotiate,
    SentChallenge,
    ReceivedChallenge,
    SentAuthenticate,
    Authenticated,
    Failed,
}

/// Secret-bearing derived key material, zeroized on drop (MS-NLMP derivations never
/// need to survive the session that produced them).
#[derive(Default, Zeroize, ZeroizeOnDrop)]
struct SecretMaterial {
    response_key_lm: Option<[u8; 16]>,
    response_key_nt: Option<[u8; 16]>,
    session_base_key: Option<[u8; 16]>,
    key_exchange_key: Option<[u8; 16]>,
    exported_session_key: Option<[u8; 16]>,
    client_signing_key: Option<[u8; 16]>,
    server_signing_key: Option<[u8; 16]>,
    client_sealing_key: Option<[u8; 16]>,
    server_sealing_key: Option<[u8; 16]>,
}

/// One end of an NTLM handshake. See [`crate::session`] module docs for the design.
pub struct Session {
    role: Role,
    mode: NtlmMode,
    state: SessionState,

    user: String,
    password: String,
    user_domain: String,
    workstation: String,
    target_domain: String,
    target_computer: String,

    flags: NegotiateFlags,
    server_challenge: [u8; 8],
    client_challenge: [u8; 8],
    client_challenge_fixed: bool,
    timestamp: Option<[u8; 8]>,

    secrets: SecretMaterial,
    lm_challenge_response: Vec<u8>,
    nt_challenge_response: Vec<u8>,
    encrypted_random_session_key: Vec<u8>,
    mic: [u8; 16],

    client_handle: Option<Rc4Handle>,
    server_handle: Option<Rc4Handle>,

    negotiate_message: Option<NegotiateMessage>,
    challenge_message: Option<ChallengeMessage>,
    authenticate_message: Option<AuthenticateMessage>,
}

impl Session {
    pub fn new_client(mode: NtlmMode) -> Self {
        Self::new(Role::Client, mode)
    }

    pub fn new_server(mode: NtlmMode) -> Self {
        Self::new(Role::Server, mode)
    }

    fn new(role: Role, mode: NtlmMode) -> Self {
        Self {
            role,
            mode,
            state: SessionState::Init,
            user: String::new(),
            password: String::new(),
            user_domain: String::new(),
            workstation: String::new(),
            target_domain: String::new(),
            target_computer: String::new(),
            flags: NegotiateFlags::empty(),
            server_challenge: [0u8; 8],
            client_challenge: [0u8; 8],
            client_challenge_fixed: false,
            timestamp: None,
            secrets: SecretMaterial::default(),
            lm_challenge_response: Vec::new(),
            nt_challenge_response: Vec::new(),
            encrypted_random_session_key: Vec::new(),
            mic: [0u8; 16],
            client_handle: None,
            server_handle: None,
            negotiate_message: None,
            challenge_message: None,
            authenticate_message: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Credentials used both to build the client's responses and, on the server side,
    /// to recompute the expected responses for comparison (this library does not
    /// implement a credential store; callers supply the looked-up password).
    pub fn set_user_info(&mut self, user: impl Into<String>, password: impl Into<String>, user_domain: impl Into<String>) {
        self.user = user.into();
        self.password = password.into();
        self.user_domain = user_domain.into();
    }

    /// Client-side workstation name advertised in the Negotiate/Authenticate messages.
    /// The original source hardcoded this; §9 calls that out as a placeholder to make
    /// configurable.
    pub fn set_workstation(&mut self, workstation: impl Into<String>) {
        self.workstation = workstation.into();
    }

    /// Server-side domain/computer names advertised in the Challenge message's
    /// TargetInfo. The original source hardcoded these as well.
    pub fn set_target_info(&mut self, target_domain: impl Into<String>, target_computer: impl Into<String>) {
        self.target_domain = target_domain.into();
        self.target_computer = target_computer.into();
    }

    /// Override the server challenge instead of drawing one at random (testability hook
    /// named directly in §6's library surface).
    pub fn set_server_challenge(&mut self, challenge: [u8; 8]) {
        self.server_challenge = challenge;
    }

    /// Override the client challenge instead of drawing one at random. Exists for the
    /// same reason as [`Session::set_server_challenge`]; not part of a real deployment.
    pub fn set_client_challenge(&mut self, challenge: [u8; 8]) {
        self.client_challenge = challenge;
        self.client_challenge_fixed = true;
    }

    /// Override the NTLMv2 `temp` timestamp instead of using wall-clock time.
    pub fn set_timestamp(&mut self, filetime: [u8; 8]) {
        self.timestamp = Some(filetime);
    }

    fn require_role(&self, expected: Role) -> NtlmResult<()> {
        if self.role != expected {
            return Err(NtlmError::unsupported("operation not valid for this session's role"));
        }
        Ok(())
    }

    // ---- Client side ----------------------------------------------------

    /// Optional: some callers synthesize the Negotiate message externally instead.
    pub fn generate_negotiate_message(&mut self) -> NtlmResult<Vec<u8>> {
        self.require_role(Role::Client)?;
        let flags = NegotiateFlags::client_default();
        let msg = NegotiateMessage::new(flags, &self.user_domain, &self.workstation, Some(default_version()));
        let bytes = msg.encode();
        self.negotiate_message = Some(msg);
        self.state = SessionState::SentNegotiate;
        debug!(?self.mode, "client sent Negotiate");
        Ok(bytes)
    }

    pub fn process_challenge_message(&mut self, bytes: &[u8]) -> NtlmResult<()> {
        self.require_role(Role::Client)?;
        let msg = ChallengeMessage::decode(bytes)?;

        self.server_challenge = msg.server_challenge;
        if !self.client_challenge_fixed {
            self.client_challenge = random_array8();
        }
        self.flags = NegotiateFlags::client_default();

        let target_info_bytes = msg.target_info.as_bytes();
        let timestamp = self.timestamp.unwrap_or_else(windows_filetime_now);

        self.fetch_response_keys()?;
        self.compute_expected_responses(&target_info_bytes, &timestamp)?;
        self.compute_key_exchange_key_client()?;
        self.compute_encrypted_session_key_client();
        self.calculate_keys(msg.version.as_ref())?;

        self.challenge_message = Some(msg);
        self.state = SessionState::ReceivedChallenge;
        debug!(?self.mode, "client processed Challenge, derived session keys");
        Ok(())
    }

    pub fn generate_authenticate_message(&mut self) -> NtlmResult<Vec<u8>> {
        self.require_role(Role::Client)?;
        if self.state != SessionState::ReceivedChallenge {
            return Err(NtlmError::unsupported("GenerateAuthenticateMessage before ProcessChallengeMessage"));
        }

        let msg = AuthenticateMessage::new(
            self.lm_challenge_response.clone(),
            self.nt_challenge_response.clone(),
            &self.user_domain,
            &self.user,
            &self.workstation,
            self.encrypted_random_session_key.clone(),
            self.flags,
            Some(default_version()),
            Some(self.mic),
        );
        let bytes = msg.encode();
        self.authenticate_message = Some(msg);
        self.state = SessionState::SentAuthenticate;
        debug!("client sent Authenticate");
        Ok(bytes)
    }

    // ---- Server side ------------------------------------------------------

    pub fn process_negotiate_message(&mut self, bytes: &[u8]) -> NtlmResult<()> {
        self.require_role(Role::Server)?;
        let msg = NegotiateMessage::decode(bytes)?;
        self.negotiate_message = Some(msg);
        self.state = SessionState::ReceivedNegotiate;
        debug!("server processed Negotiate");
        Ok(())
    }

    pub fn generate_challenge_message(&mut self) -> NtlmResult<Vec<u8>> {
        self.require_role(Role::Server)?;
        if self.server_challenge == [0u8; 8] {
            self.server_challenge = random_array8();
        }
        self.flags = NegotiateFlags::server_default();

        let mut target_info = crate::av_pair::AvPairs::new();
        if !self.target_domain.is_empty() {
            target_info.push(crate::av_pair::AvPair::string(
                crate::av_pair::MSV_AV_NB_DOMAIN_NAME,
                &self.target_domain,
            ));
        }
        if !self.target_computer.is_empty() {
            target_info.push(crate::av_pair::AvPair::string(
                crate::av_pair::MSV_AV_NB_COMPUTER_NAME,
                &self.target_computer,
            ));
        }
        target_info.push(crate::av_pair::AvPair::eol());

        let msg = ChallengeMessage::new(&self.target_domain, self.flags, self.server_challenge, target_info, Some(default_version()));
        let bytes = msg.encode();
        self.challenge_message = Some(msg);
        self.state = SessionState::SentChallenge;
        debug!(?self.mode, "server sent Challenge");
        Ok(bytes)
    }

    pub fn process_authenticate_message(&mut self, bytes: &[u8]) -> NtlmResult<()> {
        self.require_role(Role::Server)?;
        let msg = AuthenticateMessage::decode(bytes)?;
        self.flags = msg.flags;
        self.lm_challenge_response = msg.lm_challenge_response.clone();
        self.nt_challenge_response = msg.nt_challenge_response.clone();
        self.encrypted_random_session_key = msg.encrypted_random_session_key.clone();
        self.client_challenge = msg.client_challenge().unwrap_or([0u8; 8]);

        self.fetch_response_keys()?;

        let (expected_nt, expected_lm, nt_proof_str) = match self.mode {
            NtlmMode::V1 => {
                let responses = compute_v1_responses(
                    self.flags,
                    self.secrets.response_key_nt.as_ref().unwrap(),
                    self.secrets.response_key_lm.as_ref().unwrap(),
                    &self.server_challenge,
                    &self.client_challenge,
                )?;
                (responses.nt_challenge_response, responses.lm_challenge_response, None)
            }
            NtlmMode::V2 => {
                if msg.nt_challenge_response.len() < 16 + 32 {
                    return Err(NtlmError::malformed("NTLMv2 NtChallengeResponse too short"));
                }
                let temp = &msg.nt_challenge_response[16..];
                if temp.len() < 36 {
                    return Err(NtlmError::malformed("NTLMv2 client-challenge temp too short"));
                }
                let mut timestamp = [0u8; 8];
                timestamp.copy_from_slice(&temp[8..16]);
                let av_pairs_bytes = &temp[28..temp.len() - 4];

                let responses = compute_v2_responses(
                    self.secrets.response_key_nt.as_ref().unwrap(),
                    self.secrets.response_key_lm.as_ref().unwrap(),
                    &self.server_challenge,
                    &self.client_challenge,
                    &timestamp,
                    av_pairs_bytes,
                )?;
                (responses.nt_challenge_response, responses.lm_challenge_response, Some(responses.nt_proof_str))
            }
        };

        let accepted = msg.nt_challenge_response == expected_nt || msg.lm_challenge_response == expected_lm;
        if !accepted {
            self.state = SessionState::Failed;
            warn!(?self.mode, user = %self.user, "NTLM authentication rejected: response mismatch");
            return Err(NtlmError::authentication_failed("challenge response mismatch"));
        }
        debug!(?self.mode, user = %self.user, "NTLM authentication accepted");

        let session_base_key = match self.mode {
            NtlmMode::V1 => session_base_key_v1(self.secrets.response_key_nt.as_ref().unwrap()),
            NtlmMode::V2 => session_base_key_v2(self.secrets.response_key_nt.as_ref().unwrap(), nt_proof_str.as_ref().unwrap())?,
        };
        self.secrets.session_base_key = Some(session_base_key);

        let key_exchange_key = match self.mode {
            NtlmMode::V2 => session_base_key,
            NtlmMode::V1 => {
                if self.flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
                    kxkey_v1_extended(&session_base_key, &self.server_challenge, &self.lm_challenge_response)?
                } else {
                    kxkey_v1(
                        self.flags,
                        &session_base_key,
                        &self.lm_challenge_response,
                        self.secrets.response_key_lm.as_ref().unwrap(),
                    )?
                }
            }
        };
        self.secrets.key_exchange_key = Some(key_exchange_key);

        let exported_session_key = exported_session_key_server(self.flags, &key_exchange_key, &self.encrypted_random_session_key);
        self.secrets.exported_session_key = Some(exported_session_key);

        self.mic = msg.mic.unwrap_or([0u8; 16]);
        self.calculate_keys(msg.version.as_ref())?;

        self.authenticate_message = Some(msg);
        self.state = SessionState::Authenticated;
        Ok(())
    }

    // ---- Shared derivation pipeline ---------------------------------------

    fn fetch_response_keys(&mut self) -> NtlmResult<()> {
        let (nt, lm) = match self.mode {
            NtlmMode::V1 => (ntowfv1(&self.password), lmowfv1(&self.password)?),
            NtlmMode::V2 => {
                let nt = ntowfv2(&self.user, &self.password, &self.user_domain)?;
                let lm = lmowfv2(&self.user, &self.password, &self.user_domain)?;
                (nt, lm)
            }
        };
        self.secrets.response_key_nt = Some(nt);
        self.secrets.response_key_lm = Some(lm);
        Ok(())
    }

    /// Client side: derive and store `lm_challenge_response` / `nt_challenge_response`.
    fn compute_expected_responses(&mut self, target_info_bytes: &[u8], timestamp: &[u8; 8]) -> NtlmResult<()> {
        match self.mode {
            NtlmMode::V1 => {
                let responses = compute_v1_responses(
                    self.flags,
                    self.secrets.response_key_nt.as_ref().unwrap(),
                    self.secrets.response_key_lm.as_ref().unwrap(),
                    &self.server_challenge,
                    &self.client_challenge,
                )?;
                self.nt_challenge_response = responses.nt_challenge_response;
                self.lm_challenge_response = responses.lm_challenge_response;
                self.secrets.session_base_key = Some(session_base_key_v1(self.secrets.response_key_nt.as_ref().unwrap()));
            }
            NtlmMode::V2 => {
                let responses = compute_v2_responses(
                    self.secrets.response_key_nt.as_ref().unwrap(),
                    self.secrets.response_key_lm.as_ref().unwrap(),
                    &self.server_challenge,
                    &self.client_challenge,
                    timestamp,
                    target_info_bytes,
                )?;
                self.nt_challenge_response = responses.nt_challenge_response;
                self.lm_challenge_response = responses.lm_challenge_response;
                self.secrets.session_base_key =
                    Some(session_base_key_v2(self.secrets.response_key_nt.as_ref().unwrap(), &responses.nt_proof_str)?);
            }
        }
        Ok(())
    }

    fn compute_key_exchange_key_client(&mut self) -> NtlmResult<()> {
        let session_base_key = *self.secrets.session_base_key.as_ref().unwrap();
        let key_exchange_key = match self.mode {
            NtlmMode::V2 => session_base_key,
            NtlmMode::V1 => {
                if self.flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
                    kxkey_v1_extended(&session_base_key, &self.server_challenge, &self.lm_challenge_response)?
                } else {
                    kxkey_v1(
                        self.flags,
                        &session_base_key,
                        &self.lm_challenge_response,
                        self.secrets.response_key_lm.as_ref().unwrap(),
                    )?
                }
            }
        };
        self.secrets.key_exchange_key = Some(key_exchange_key);
        Ok(())
    }

    fn compute_encrypted_session_key_client(&mut self) {
        let key_exchange_key = *self.secrets.key_exchange_key.as_ref().unwrap();
        let random_session_key = random_array16();
        let (encrypted, exported) = exported_session_key_client(self.flags, &key_exchange_key, &random_session_key);
        self.encrypted_random_session_key = encrypted;
        self.secrets.exported_session_key = Some(exported);
    }

    /// SIGNKEY/SEALKEY for both directions, plus RC4 handle initialization. Shared by
    /// client and server once `exported_session_key` is known. `peer_version` applies
    /// the §4.9 NEGOTIATE_LM_KEY quirk.
    fn calculate_keys(&mut self, peer_version: Option<&Version>) -> NtlmResult<()> {
        if let Some(version) = peer_version {
            if version.ntlm_revision_current == 0x0F {
                self.flags = self.flags.set(NegotiateFlags::NEGOTIATE_LM_KEY);
            }
        }

        let exported_session_key = *self.secrets.exported_session_key.as_ref().unwrap();

        self.secrets.client_signing_key = sign_key(self.flags, &exported_session_key, Party::Client);
        self.secrets.server_signing_key = sign_key(self.flags, &exported_session_key, Party::Server);

        if self.flags.is_set(NegotiateFlags::NEGOTIATE_LM_KEY) && !self.flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
            return Err(NtlmError::unsupported(
                "NEGOTIATE_LM_KEY sealing without extended session security uses an 8-byte RC4 key this crate does not wire up",
            ));
        }

        self.secrets.client_sealing_key = seal_key(self.flags, &exported_session_key, Party::Client);
        self.secrets.server_sealing_key = seal_key(self.flags, &exported_session_key, Party::Server);

        self.client_handle = self.secrets.client_sealing_key.map(|k| rc4_init(&k));
        self.server_handle = self.secrets.server_sealing_key.map(|k| rc4_init(&k));

        Ok(())
    }

    /// Exported session key, once the handshake has completed on this side.
    pub fn exported_session_key(&self) -> Option<[u8; 16]> {
        self.secrets.exported_session_key
    }

    // ---- Post-authentication operations ------------------------------------

    fn own_signing_key(&self) -> NtlmResult<[u8; 16]> {
        let key = match self.role {
            Role::Client => self.secrets.client_signing_key,
            Role::Server => self.secrets.server_signing_key,
        };
        key.ok_or_else(|| NtlmError::unsupported("signing key unavailable without extended session security"))
    }

    fn own_seal_handle(&mut self) -> &mut Option<Rc4Handle> {
        match self.role {
            Role::Client => &mut self.client_handle,
            Role::Server => &mut self.server_handle,
        }
    }

    /// True once this side of the handshake has derived its keys and may Sign/Seal/Mac
    /// application traffic: `SENT_AUTHENTICATE` for the client (MS-NLMP's client state
    /// machine has no post-handshake state of its own — it never learns whether the
    /// server accepted), `AUTHENTICATED` for the server.
    fn is_ready_for_application_traffic(&self) -> bool {
        match self.role {
            Role::Client => self.state == SessionState::SentAuthenticate,
            Role::Server => self.state == SessionState::Authenticated,
        }
    }

    /// `Mac(message, seqNum)` (MS-NLMP 3.4.4). Sequence-number tracking across calls is
    /// the caller's responsibility per §9's design notes.
    pub fn mac(&mut self, message: &[u8], seq_num: u32) -> NtlmResult<[u8; 16]> {
        if !self.is_ready_for_application_traffic() {
            return Err(NtlmError::authentication_failed("session has not completed the handshake"));
        }
        let signing_key = self.own_signing_key()?;
        let flags = self.flags;
        let handle = self.own_seal_handle();
        let mut scratch = handle.take().unwrap_or_else(|| rc4_init(&[0u8; 16]));
        let result = mac_kernel(flags, &mut scratch, &signing_key, seq_num, message);
        *self.own_seal_handle() = Some(scratch);
        result
    }

    /// `Sign` (MS-NLMP 3.4.3): in connection-oriented mode this is the same computation
    /// as `Mac`; the source leaves it as a stub, which this crate completes.
    pub fn sign(&mut self, message: &[u8], seq_num: u32) -> NtlmResult<[u8; 16]> {
        self.mac(message, seq_num)
    }

    /// `Seal` (MS-NLMP 3.4.2): RC4-encrypt `message` with this session's own directional
    /// sealing handle. Like `Sign`, the source leaves this as a stub.
    pub fn seal(&mut self, message: &[u8]) -> NtlmResult<Vec<u8>> {
        if !self.is_ready_for_application_traffic() {
            return Err(NtlmError::authentication_failed("session has not completed the handshake"));
        }
        let handle = self
            .own_seal_handle()
            .as_mut()
            .ok_or_else(|| NtlmError::unsupported("sealing key unavailable without extended session security"))?;
        Ok(rc4(handle, message))
    }
}

fn default_version() -> Version {
    Version::new(10, 0, 19041, 15)
}
