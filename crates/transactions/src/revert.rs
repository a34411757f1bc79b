//! Adjudicator revert reason strings.
//!
//! These strings are part of the contract surface: callers distinguishing
//! failure causes must match them verbatim, and the simulated adjudicator
//! reverts with exactly these values.

/// The supplied challenge context does not hash to the stored slot.
pub const CHALLENGE_STATE_MISMATCH: &str = "Challenge State does not match stored version";

/// The active challenge's `finalizesAt` has passed.
pub const CHALLENGE_TIMED_OUT: &str = "Challenge timed out";

/// `whoSignedWhat` is malformed or inconsistent with the signatures.
pub const UNACCEPTABLE_WHO_SIGNED_WHAT: &str = "Unacceptable whoSignedWhat array";

/// The proposed largest turn number does not exceed the stored record.
pub const TURN_NUM_RECORD_NOT_INCREASED: &str = "turnNumRecord not increased";

/// Transfer attempted before the channel finalised.
pub const CHANNEL_NOT_FINALIZED: &str = "Channel not finalized";

/// Transfer indices must be supplied in ascending order.
pub const INDICES_MUST_BE_SORTED: &str = "Indices must be sorted";

/// Caller-supplied storage context does not match the stored fingerprint.
pub const INCORRECT_FINGERPRINT: &str = "incorrect fingerprint";

/// The challenger signature does not recover to a channel participant.
pub const CHALLENGER_NOT_PARTICIPANT: &str = "Challenger is not a participant";

/// The response is not signed by the participant whose turn it is.
pub const RESPONSE_UNAUTHORIZED: &str = "Response not signed by authorized mover";

/// Deposit guard: current holdings are below `expectedHeld`.
pub const HOLDINGS_LT_EXPECTED: &str = "holdings < expectedHeld";

/// Deposit guard: the destination already holds the requested funds.
pub const HOLDINGS_ALREADY_SUFFICIENT: &str = "holdings already sufficient";
