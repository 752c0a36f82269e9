//! State transition rules
//!
//! Storage backends call these inside the transaction that writes the new state, so every state
//! update is a compare-and-set against the stored state.

use cashu::{MeltQuoteState, MintQuoteState, State};

/// State transition Error
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Pending Token
    #[error("Token already pending for another update")]
    Pending,
    /// Already spent
    #[error("Token already spent")]
    AlreadySpent,
    /// Invalid transition
    #[error("Invalid transition: From {0} to {1}")]
    InvalidTransition(State, State),
    /// Quote is being processed by another request
    #[error("Quote already pending for another update")]
    QuotePending,
    /// Quote has not been paid
    #[error("Quote not paid")]
    QuoteUnpaid,
    /// Already paid
    #[error("Quote already paid")]
    AlreadyPaid,
    /// Ecash already issued for quote
    #[error("Quote already issued")]
    AlreadyIssued,
    /// Quote expired
    #[error("Quote expired")]
    QuoteExpired,
    /// Invalid transition
    #[error("Invalid mint quote state transition: From {0} to {1}")]
    InvalidMintQuoteTransition(MintQuoteState, MintQuoteState),
    /// Invalid transition
    #[error("Invalid melt quote state transition: From {0} to {1}")]
    InvalidMeltQuoteTransition(MeltQuoteState, MeltQuoteState),
}

#[inline]
/// Check if the proof state transition is allowed
///
/// A proof without a stored state is [`State::Unspent`].
pub fn check_state_transition(current_state: State, new_state: State) -> Result<(), Error> {
    let is_valid_transition = match current_state {
        State::Unspent => matches!(new_state, State::Pending | State::Spent),
        State::Pending => matches!(new_state, State::Unspent | State::Spent),
        State::Spent => false,
    };

    if !is_valid_transition {
        Err(match current_state {
            State::Pending => Error::Pending,
            State::Spent => Error::AlreadySpent,
            _ => Error::InvalidTransition(current_state, new_state),
        })
    } else {
        Ok(())
    }
}

#[inline]
/// Check if the mint quote state transition is allowed
///
/// Valid transitions:
/// - Unpaid -> Paid, Expired
/// - Paid -> Pending
/// - Pending -> Issued, Paid
/// - Issued, Expired -> (no transitions allowed)
pub fn check_mint_quote_state_transition(
    current_state: MintQuoteState,
    new_state: MintQuoteState,
) -> Result<(), Error> {
    let is_valid_transition = match current_state {
        MintQuoteState::Unpaid => {
            matches!(new_state, MintQuoteState::Paid | MintQuoteState::Expired)
        }
        MintQuoteState::Paid => matches!(new_state, MintQuoteState::Pending),
        MintQuoteState::Pending => {
            matches!(new_state, MintQuoteState::Issued | MintQuoteState::Paid)
        }
        MintQuoteState::Issued | MintQuoteState::Expired => false,
    };

    if !is_valid_transition {
        Err(match current_state {
            MintQuoteState::Unpaid => match new_state {
                MintQuoteState::Pending | MintQuoteState::Issued => Error::QuoteUnpaid,
                _ => Error::InvalidMintQuoteTransition(current_state, new_state),
            },
            MintQuoteState::Paid => match new_state {
                MintQuoteState::Paid => Error::AlreadyPaid,
                _ => Error::InvalidMintQuoteTransition(current_state, new_state),
            },
            MintQuoteState::Pending => Error::QuotePending,
            MintQuoteState::Issued => Error::AlreadyIssued,
            MintQuoteState::Expired => Error::QuoteExpired,
        })
    } else {
        Ok(())
    }
}

#[inline]
/// Check if the melt quote state transition is allowed
///
/// Valid transitions:
/// - Unpaid -> Pending, Expired
/// - Pending -> Unpaid, Paid
/// - Paid, Expired -> (no transitions allowed)
pub fn check_melt_quote_state_transition(
    current_state: MeltQuoteState,
    new_state: MeltQuoteState,
) -> Result<(), Error> {
    let is_valid_transition = match current_state {
        MeltQuoteState::Unpaid => {
            matches!(new_state, MeltQuoteState::Pending | MeltQuoteState::Expired)
        }
        MeltQuoteState::Pending => {
            matches!(new_state, MeltQuoteState::Unpaid | MeltQuoteState::Paid)
        }
        MeltQuoteState::Paid | MeltQuoteState::Expired => false,
    };

    if !is_valid_transition {
        Err(match current_state {
            MeltQuoteState::Pending => Error::QuotePending,
            MeltQuoteState::Paid => Error::AlreadyPaid,
            MeltQuoteState::Expired => Error::QuoteExpired,
            _ => Error::InvalidMeltQuoteTransition(current_state, new_state),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_states() {
        assert!(check_state_transition(State::Unspent, State::Pending).is_ok());
        assert!(check_state_transition(State::Pending, State::Spent).is_ok());
        assert!(check_state_transition(State::Pending, State::Unspent).is_ok());

        assert_eq!(
            check_state_transition(State::Pending, State::Pending),
            Err(Error::Pending)
        );
        assert_eq!(
            check_state_transition(State::Spent, State::Unspent),
            Err(Error::AlreadySpent)
        );
        assert_eq!(
            check_state_transition(State::Spent, State::Pending),
            Err(Error::AlreadySpent)
        );
    }

    #[test]
    fn mint_quote_lifecycle() {
        use MintQuoteState::*;

        let path = [Unpaid, Paid, Pending, Issued];
        for step in path.windows(2) {
            assert!(check_mint_quote_state_transition(step[0], step[1]).is_ok());
        }

        assert!(check_mint_quote_state_transition(Unpaid, Expired).is_ok());
        assert!(check_mint_quote_state_transition(Pending, Paid).is_ok());
    }

    #[test]
    fn mint_quote_rejections() {
        use MintQuoteState::*;

        let table = [
            (Unpaid, Pending, Error::QuoteUnpaid),
            (Unpaid, Issued, Error::QuoteUnpaid),
            (Paid, Paid, Error::AlreadyPaid),
            (Paid, Expired, Error::InvalidMintQuoteTransition(Paid, Expired)),
            (Pending, Pending, Error::QuotePending),
            (Issued, Pending, Error::AlreadyIssued),
            (Issued, Paid, Error::AlreadyIssued),
            (Expired, Paid, Error::QuoteExpired),
        ];

        for (from, to, expected) in table {
            assert_eq!(check_mint_quote_state_transition(from, to), Err(expected));
        }
    }

    #[test]
    fn melt_quote_transitions() {
        use MeltQuoteState::*;

        assert!(check_melt_quote_state_transition(Unpaid, Pending).is_ok());
        assert!(check_melt_quote_state_transition(Pending, Paid).is_ok());
        assert!(check_melt_quote_state_transition(Pending, Unpaid).is_ok());
        assert!(check_melt_quote_state_transition(Unpaid, Expired).is_ok());

        assert_eq!(
            check_melt_quote_state_transition(Pending, Pending),
            Err(Error::QuotePending)
        );
        assert_eq!(
            check_melt_quote_state_transition(Paid, Pending),
            Err(Error::AlreadyPaid)
        );
        assert_eq!(
            check_melt_quote_state_transition(Expired, Pending),
            Err(Error::QuoteExpired)
        );
        assert_eq!(
            check_melt_quote_state_transition(Unpaid, Paid),
            Err(Error::InvalidMeltQuoteTransition(Unpaid, Paid))
        );
    }
}
