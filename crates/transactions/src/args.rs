//! Aggregating per-participant signed states into adjudicator arguments.

use crate::TransactionError;
use forcemove_types::{Signature, SignedState, State};

/// The `(states, signatures, whoSignedWhat)` triple the adjudicator expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureArguments {
    /// Distinct states, deduplicated by full value equality, in first
    /// occurrence order.
    pub states: Vec<State>,
    /// One signature per input signed state, in the original input order.
    pub signatures: Vec<Signature>,
    /// For each participant index `i`, the index into `states` of the state
    /// participant `i` signed.
    pub who_signed_what: Vec<usize>,
}

/// Build [`SignatureArguments`] from a set of signed states.
///
/// Exactly one signature per participant is required. A missing, duplicate
/// or non-participant signer is a hard error rather than a silently wrong
/// index: the adjudicator would reject the call anyway, and a typed error at
/// construction time is diagnosable where a revert is not.
pub fn create_signature_arguments(
    signed_states: &[SignedState],
) -> Result<SignatureArguments, TransactionError> {
    let first = signed_states.first().ok_or(TransactionError::Empty)?;
    let channel = &first.state.channel;
    if signed_states
        .iter()
        .any(|s| s.state.channel != *channel)
    {
        return Err(TransactionError::MixedChannels);
    }

    // Duplicate states mean multiple participants signed the same state;
    // the duplicates collapse here and reappear through whoSignedWhat.
    let mut states: Vec<State> = Vec::new();
    for signed in signed_states {
        if !states.contains(&signed.state) {
            states.push(signed.state.clone());
        }
    }

    let signatures: Vec<Signature> = signed_states.iter().map(|s| s.signature).collect();

    let mut who_signed_what: Vec<Option<usize>> = vec![None; channel.num_participants()];
    for signed in signed_states {
        let signer = signed.signer()?;
        let participant = channel
            .participant_index(signer)
            .ok_or(TransactionError::NonParticipant(signer))?;
        if who_signed_what[participant].is_some() {
            return Err(TransactionError::DuplicateSigner(signer));
        }
        let state_index = states
            .iter()
            .position(|s| *s == signed.state)
            .unwrap_or_default();
        who_signed_what[participant] = Some(state_index);
    }

    let who_signed_what = who_signed_what
        .into_iter()
        .enumerate()
        .map(|(i, entry)| entry.ok_or(TransactionError::MissingSignature(channel.participants[i])))
        .collect::<Result<Vec<usize>, _>>()?;

    Ok(SignatureArguments {
        states,
        signatures,
        who_signed_what,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use forcemove_types::{Address, Bytes, Channel, KeyPair, Outcome, State, U256};

    fn keys() -> Vec<KeyPair> {
        (1u8..=3)
            .map(|seed| KeyPair::from_seed(&[seed; 32]).unwrap())
            .collect()
    }

    fn state_for(keys: &[KeyPair], turn_num: u64) -> State {
        let channel = Channel::new(
            U256::from(1234),
            U256::from(1),
            keys.iter().map(|k| k.address()).collect(),
        );
        State {
            channel,
            turn_num,
            is_final: false,
            outcome: Outcome::empty(),
            app_definition: Address::repeat_byte(0xaa),
            app_data: Bytes::new(),
            challenge_duration: 300,
        }
    }

    #[test]
    fn three_cosigners_of_one_state() {
        let keys = keys();
        let state = state_for(&keys, 4);
        let signed: Vec<_> = keys.iter().map(|k| state.sign(k).unwrap()).collect();

        let args = create_signature_arguments(&signed).unwrap();
        assert_eq!(args.states.len(), 1);
        assert_eq!(args.signatures.len(), 3);
        assert_eq!(args.who_signed_what, vec![0, 0, 0]);
    }

    #[test]
    fn who_signed_what_is_positional_by_participant() {
        let keys = keys();
        let s4 = state_for(&keys, 4);
        let s5 = state_for(&keys, 5);
        let s6 = state_for(&keys, 6);

        // Round-robin: participant 1 signs turn 4, participant 2 turn 5,
        // participant 0 turn 6. Input order deliberately scrambled.
        let signed = vec![
            s5.sign(&keys[2]).unwrap(),
            s6.sign(&keys[0]).unwrap(),
            s4.sign(&keys[1]).unwrap(),
        ];

        let args = create_signature_arguments(&signed).unwrap();
        // First occurrence order: s5, s6, s4.
        assert_eq!(args.states[0].turn_num, 5);
        assert_eq!(args.states[1].turn_num, 6);
        assert_eq!(args.states[2].turn_num, 4);
        // Indexed by participant position, not input order.
        assert_eq!(args.who_signed_what, vec![1, 2, 0]);
        // Signatures stay in input order.
        assert_eq!(args.signatures[0], signed[0].signature);
    }

    #[test]
    fn missing_participant_is_an_error() {
        let keys = keys();
        let state = state_for(&keys, 4);
        let signed = vec![state.sign(&keys[0]).unwrap(), state.sign(&keys[2]).unwrap()];

        let err = create_signature_arguments(&signed).unwrap_err();
        assert_eq!(err, TransactionError::MissingSignature(keys[1].address()));
    }

    #[test]
    fn duplicate_signer_is_an_error() {
        let keys = keys();
        let s4 = state_for(&keys, 4);
        let s5 = state_for(&keys, 5);
        let signed = vec![
            s4.sign(&keys[0]).unwrap(),
            s5.sign(&keys[0]).unwrap(),
            s4.sign(&keys[1]).unwrap(),
        ];

        let err = create_signature_arguments(&signed).unwrap_err();
        assert_eq!(err, TransactionError::DuplicateSigner(keys[0].address()));
    }

    #[test]
    fn non_participant_is_an_error() {
        let keys = keys();
        let outsider = KeyPair::from_seed(&[9u8; 32]).unwrap();
        let state = state_for(&keys, 4);
        let signed = vec![state.sign(&outsider).unwrap()];

        let err = create_signature_arguments(&signed).unwrap_err();
        assert_eq!(err, TransactionError::NonParticipant(outsider.address()));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(
            create_signature_arguments(&[]).unwrap_err(),
            TransactionError::Empty
        );
    }
}
