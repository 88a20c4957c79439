//! End-to-end client/server handshakes, driven entirely through the public
//! `Session` surface (no internal derivation helpers).

use ntlm_nlmp::session::{NtlmMode, Session};

const SERVER_CHALLENGE: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
const CLIENT_CHALLENGE: [u8; 8] = [0xaa; 8];

fn run_v2_handshake(client_password: &str, server_password: &str) -> (Session, Session, ntlm_nlmp::NtlmResult<()>) {
    let mut client = Session::new_client(NtlmMode::V2);
    client.set_user_info("User", client_password, "Domain");
    client.set_workstation("COMPUTER");
    client.set_client_challenge(CLIENT_CHALLENGE);
    client.set_timestamp([0u8; 8]);

    let mut server = Session::new_server(NtlmMode::V2);
    server.set_user_info("User", server_password, "Domain");
    server.set_server_challenge(SERVER_CHALLENGE);
    server.set_target_info("Domain", "Server");

    let challenge_bytes = server.generate_challenge_message().unwrap();
    client.process_challenge_message(&challenge_bytes).unwrap();
    let authenticate_bytes = client.generate_authenticate_message().unwrap();
    let result = server.process_authenticate_message(&authenticate_bytes);

    (client, server, result)
}

#[test]
fn v2_mutual_handshake_matching_credentials_succeeds() {
    let (client, server, result) = run_v2_handshake("Password", "Password");
    result.expect("authentication should succeed with matching credentials");

    assert_eq!(server.state(), ntlm_nlmp::SessionState::Authenticated);
    assert_eq!(client.exported_session_key(), server.exported_session_key());
    assert!(client.exported_session_key().is_some());
}

#[test]
fn v2_mutual_handshake_wrong_password_fails() {
    let (_client, server, result) = run_v2_handshake("Password", "NotThePassword");
    assert!(matches!(result, Err(ntlm_nlmp::NtlmError::AuthenticationFailed(_))));
    assert_eq!(server.state(), ntlm_nlmp::SessionState::Failed);
}

#[test]
fn v1_mutual_handshake_matching_credentials_succeeds() {
    let mut client = Session::new_client(NtlmMode::V1);
    client.set_user_info("User", "Password", "Domain");
    client.set_workstation("COMPUTER");
    client.set_client_challenge(CLIENT_CHALLENGE);

    let mut server = Session::new_server(NtlmMode::V1);
    server.set_user_info("User", "Password", "Domain");
    server.set_server_challenge(SERVER_CHALLENGE);
    server.set_target_info("Domain", "Server");

    let challenge_bytes = server.generate_challenge_message().unwrap();
    client.process_challenge_message(&challenge_bytes).unwrap();
    let authenticate_bytes = client.generate_authenticate_message().unwrap();
    server.process_authenticate_message(&authenticate_bytes).unwrap();

    assert_eq!(server.state(), ntlm_nlmp::SessionState::Authenticated);
    assert_eq!(client.exported_session_key(), server.exported_session_key());
}

#[test]
fn authenticated_session_macs_differ_across_sequence_numbers() {
    let (mut client, mut server, result) = run_v2_handshake("Password", "Password");
    result.unwrap();

    let sig0 = server.mac(b"Plaintext", 0).unwrap();
    let sig1 = server.mac(b"Plaintext", 1).unwrap();
    assert_eq!(sig0.len(), 16);
    assert_ne!(sig0, sig1);

    // The client reaches `SentAuthenticate`, not `Authenticated` (only the server side
    // of MS-NLMP's state machine has a post-handshake success state), but it already
    // has its directional keys and can Mac its own outgoing traffic too.
    let client_sig = client.mac(b"Plaintext", 0).unwrap();
    assert_eq!(client_sig.len(), 16);
}

#[test]
fn malformed_authenticate_message_offset_past_end_is_rejected() {
    let mut server = Session::new_server(NtlmMode::V2);
    server.set_user_info("User", "Password", "Domain");
    server.set_server_challenge(SERVER_CHALLENGE);

    let mut client = Session::new_client(NtlmMode::V2);
    client.set_user_info("User", "Password", "Domain");
    client.set_client_challenge(CLIENT_CHALLENGE);
    client.set_timestamp([0u8; 8]);

    let challenge_bytes = server.generate_challenge_message().unwrap();
    client.process_challenge_message(&challenge_bytes).unwrap();
    let mut authenticate_bytes = client.generate_authenticate_message().unwrap();

    // Corrupt the NtChallengeResponse field's offset (the trailing 4 bytes of its
    // 8-byte triplet at header bytes 20..28: length@20..22, maxLength@22..24,
    // offset@24..28) to point past the end of the message.
    let len = authenticate_bytes.len() as u32;
    authenticate_bytes[24..28].copy_from_slice(&(len + 1000).to_le_bytes());

    let outcome = server.process_authenticate_message(&authenticate_bytes);
    assert!(matches!(outcome, Err(ntlm_nlmp::NtlmError::MalformedMessage(_))));
}
