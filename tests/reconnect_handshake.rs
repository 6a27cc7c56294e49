// Copyright (c) 2026 Tributary
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

mod common;

use common::{assert_trees_equal, registry, sample_tree};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::io::Cursor;
use tributary::core::types::SignerId;
use tributary::networking::reconnect::{
    request, serve, ReconnectError, ReconnectPolicy, ServeOutcome, SignatureSet,
    COMM_STATE_NACK, COMM_STATE_REQUEST,
};

fn signed_set(tree: &tributary::core::merkle::MerkleTree) -> SignatureSet {
    let root = tree.root().unwrap();
    let digest = tree.node(root).unwrap().hash().unwrap();
    let rng = SystemRandom::new();
    let mut set = SignatureSet::new();
    for _ in 0..3 {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let key = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let signature = key.sign(digest.as_bytes());
        set.add(
            SignerId(key.public_key().as_ref().to_vec()),
            signature.as_ref().to_vec(),
        );
    }
    set
}

#[test]
fn accepted_request_streams_signed_state() {
    let tree = sample_tree(b"a", b"b", b"c");
    let signatures = signed_set(&tree);
    let policy = ReconnectPolicy::new(1);

    // Learner request bytes.
    let mut learner_out = Vec::new();
    let mut learner_in = Vec::new();
    {
        let mut request_stream = Cursor::new(vec![COMM_STATE_REQUEST]);
        let outcome = serve(
            &tree,
            &signatures,
            &policy,
            &mut request_stream,
            &mut learner_in,
        )
        .unwrap();
        assert!(matches!(outcome, ServeOutcome::Taught));
    }

    let reg = registry();
    let mut reader = Cursor::new(&learner_in[..]);
    let (got, got_signatures) =
        request(&reg, 1024, &mut reader, &mut learner_out).unwrap();
    assert_eq!(learner_out, vec![COMM_STATE_REQUEST]);
    assert_eq!(got_signatures.len(), 3);
    assert_trees_equal(&tree, &got);
    assert_eq!(policy.active(), 0, "permit released");
}

#[test]
fn refusal_is_nack_and_nonfatal() {
    let tree = sample_tree(b"a", b"b", b"c");
    let signatures = signed_set(&tree);
    let policy = ReconnectPolicy::new(0);

    let mut teacher_out = Vec::new();
    let mut request_stream = Cursor::new(vec![COMM_STATE_REQUEST]);
    let outcome = serve(
        &tree,
        &signatures,
        &policy,
        &mut request_stream,
        &mut teacher_out,
    )
    .unwrap();
    assert!(matches!(outcome, ServeOutcome::Refused));
    assert_eq!(teacher_out, vec![COMM_STATE_NACK]);

    let reg = registry();
    let mut sink = Vec::new();
    let err = request(&reg, 1024, &mut Cursor::new(&teacher_out[..]), &mut sink).unwrap_err();
    assert!(matches!(err, ReconnectError::Refused));
}

#[test]
fn garbage_handshake_bytes_are_rejected_on_both_sides() {
    let tree = sample_tree(b"a", b"b", b"c");
    let signatures = signed_set(&tree);
    let policy = ReconnectPolicy::new(1);

    let mut sink = Vec::new();
    let err = serve(
        &tree,
        &signatures,
        &policy,
        &mut Cursor::new(vec![0x00]),
        &mut sink,
    )
    .unwrap_err();
    assert!(matches!(err, ReconnectError::BadHandshakeByte(0x00)));

    let reg = registry();
    let mut out = Vec::new();
    let err = request(&reg, 1024, &mut Cursor::new(vec![0x77]), &mut out).unwrap_err();
    assert!(matches!(err, ReconnectError::BadHandshakeByte(0x77)));
}

#[test]
fn tampered_signature_fails_verification() {
    let tree = sample_tree(b"a", b"b", b"c");
    let mut signatures = signed_set(&tree);
    // A signature over something else entirely.
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let key = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
    let bogus = key.sign(b"some other payload");
    signatures.add(
        SignerId(key.public_key().as_ref().to_vec()),
        bogus.as_ref().to_vec(),
    );

    let policy = ReconnectPolicy::new(1);
    let mut learner_in = Vec::new();
    serve(
        &tree,
        &signatures,
        &policy,
        &mut Cursor::new(vec![COMM_STATE_REQUEST]),
        &mut learner_in,
    )
    .unwrap();

    let reg = registry();
    let mut out = Vec::new();
    let err = request(&reg, 1024, &mut Cursor::new(&learner_in[..]), &mut out).unwrap_err();
    assert!(matches!(err, ReconnectError::SignatureInvalid(_)));
}
