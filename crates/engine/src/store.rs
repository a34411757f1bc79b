//! Per-channel signed-state records.

use crate::EngineError;
use forcemove_types::{
    Address, Channel, ChannelId, ChannelStorage, KeyPair, Signature, SignedState, State, U256,
};
use std::collections::{BTreeMap, HashMap};

/// One turn's state together with every signature collected for it.
///
/// Signatures are keyed by participant index, so a redelivered signature is
/// a no-op and a support proof can be rebuilt at any time.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub state: State,
    pub signatures: BTreeMap<usize, Signature>,
}

impl StateEntry {
    fn new(state: State) -> Self {
        StateEntry {
            state,
            signatures: BTreeMap::new(),
        }
    }

    /// Whether all `num_participants` signatures are present.
    pub fn is_fully_signed(&self, num_participants: usize) -> bool {
        self.signatures.len() == num_participants
    }

    /// Expand into one [`SignedState`] per collected signature.
    pub fn signed_states(&self) -> Vec<SignedState> {
        self.signatures
            .values()
            .map(|signature| SignedState {
                state: self.state.clone(),
                signature: *signature,
            })
            .collect()
    }
}

/// Everything this participant knows about one channel.
///
/// `on_chain` mirrors the adjudicator's `ChannelStorage` as reconstructed
/// from chain events; `frozen` is set when that mirror is caught disagreeing
/// with the chain, after which every write is refused.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub channel: Channel,
    /// Our index in `channel.participants`.
    pub my_index: usize,
    /// Known states keyed by turn number.
    pub entries: BTreeMap<u64, StateEntry>,
    /// Latest observed holdings per asset holder.
    pub funding: HashMap<Address, U256>,
    /// Local mirror of the adjudicator's channel storage.
    pub on_chain: ChannelStorage,
    pub frozen: bool,
}

impl ChannelRecord {
    pub fn new(channel: Channel, my_index: usize) -> Self {
        ChannelRecord {
            channel,
            my_index,
            entries: BTreeMap::new(),
            funding: HashMap::new(),
            on_chain: ChannelStorage::open(0),
            frozen: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn ensure_writable(&self) -> Result<(), EngineError> {
        if self.frozen {
            Err(EngineError::ChannelFrozen(self.id()))
        } else {
            Ok(())
        }
    }

    /// Ingest a signed state from the wire.
    ///
    /// Returns `true` when the signature was new, `false` on redelivery.
    /// A different state at an already-known turn number is rejected; each
    /// turn has exactly one canonical state in this channel's history.
    pub fn add_signed_state(&mut self, signed: &SignedState) -> Result<bool, EngineError> {
        self.ensure_writable()?;
        let signer = signed.signer()?;
        let index = self
            .channel
            .participant_index(signer)
            .ok_or(EngineError::NotParticipant(signer))?;

        let turn_num = signed.state.turn_num;
        let entry = self
            .entries
            .entry(turn_num)
            .or_insert_with(|| StateEntry::new(signed.state.clone()));
        if entry.state != signed.state {
            return Err(EngineError::StateConflict {
                channel_id: self.channel.id(),
                turn_num,
            });
        }
        Ok(entry.signatures.insert(index, signed.signature).is_none())
    }

    /// Sign `state` with `key` and record the signature.
    ///
    /// Returns `None` when our signature for that turn is already present.
    pub fn sign_state(
        &mut self,
        state: State,
        key: &KeyPair,
    ) -> Result<Option<SignedState>, EngineError> {
        self.ensure_writable()?;
        if let Some(entry) = self.entries.get(&state.turn_num) {
            if entry.signatures.contains_key(&self.my_index) {
                return Ok(None);
            }
        }
        let signed = state.sign(key)?;
        self.add_signed_state(&signed)?;
        Ok(Some(signed))
    }

    pub fn is_fully_signed(&self, turn_num: u64) -> bool {
        self.entries
            .get(&turn_num)
            .map(|e| e.is_fully_signed(self.channel.num_participants()))
            .unwrap_or(false)
    }

    /// The highest turn number every participant has signed.
    pub fn latest_fully_signed(&self) -> Option<u64> {
        self.entries
            .iter()
            .rev()
            .find(|(_, e)| e.is_fully_signed(self.channel.num_participants()))
            .map(|(turn, _)| *turn)
    }

    /// The state at the highest known turn number.
    pub fn latest_state(&self) -> Option<&State> {
        self.entries.values().next_back().map(|e| &e.state)
    }

    /// The lowest turn carrying a final state, if any.
    pub fn final_turn(&self) -> Option<u64> {
        self.entries
            .iter()
            .find(|(_, e)| e.state.is_final)
            .map(|(turn, _)| *turn)
    }

    pub fn set_funding(&mut self, asset_holder: Address, amount: U256) {
        self.funding.insert(asset_holder, amount);
    }

    /// Whether on-chain holdings cover the prefund outcome in full.
    ///
    /// Compares the turn-zero state's outcome totals against the latest
    /// observed holdings per asset holder. Without a turn-zero state the
    /// funding target is unknown, so the answer is `false`.
    pub fn is_funded(&self) -> bool {
        let Some(entry) = self.entries.get(&0) else {
            return false;
        };
        entry.state.outcome.asset_holders().iter().all(|&holder| {
            let held = self.funding.get(&holder).copied().unwrap_or(U256::ZERO);
            held >= entry.state.outcome.total_allocated(holder)
        })
    }

    /// Every signed state this record holds, for resynchronisation.
    pub fn all_signed_states(&self) -> Vec<SignedState> {
        self.entries
            .values()
            .flat_map(|entry| entry.signed_states())
            .collect()
    }

    /// The full support proof for `turn_num`, empty unless fully signed.
    pub fn support_proof(&self, turn_num: u64) -> Vec<SignedState> {
        match self.entries.get(&turn_num) {
            Some(entry) if entry.is_fully_signed(self.channel.num_participants()) => {
                entry.signed_states()
            }
            _ => Vec::new(),
        }
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}
