//! Booking rule violations.
//!
//! Each violation renders as a French message keyed by the field the
//! client should highlight, e.g. `{"quantity": ["..."]}`.

use serde_json::{Value, json};

use crate::domain::{Cents, Error, ErrorCode};

/// A booking rule refused the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    /// The stock does not exist.
    #[error("stockId ne correspond à aucun stock")]
    StockDoesNotExist,
    /// The booking does not exist or belongs to someone else.
    #[error("bookingId ne correspond à aucune réservation")]
    BookingDoesntExist,
    /// The user already holds a live booking on this offer.
    #[error("Cette offre a déjà été réservée par l'utilisateur")]
    OfferIsAlreadyBooked,
    /// Only one place may be booked.
    #[error("Vous ne pouvez réserver qu'une place pour cette offre.")]
    QuantityIsNotOne,
    /// Duo offers accept one or two places.
    #[error("Vous devez réserver une place ou deux dans le cas d'une offre DUO.")]
    DuoQuantityIsInvalid,
    /// The stock cannot be booked (sold out, expired, deactivated).
    #[error("Ce stock n'est pas réservable")]
    StockIsNotBookable,
    /// Free offers are reserved to beneficiaries.
    #[error("Votre compte ne vous permet pas de faire de réservation.")]
    CannotBookFreeOffers,
    /// The offer's subcategory is closed to underage beneficiaries.
    #[error("Cette catégorie d'offre n'est pas réservable avec le pass Culture 15-17 ans.")]
    OfferCategoryNotBookableByUser,
    /// The deposit balance is too low or the deposit has expired.
    #[error("Le solde de votre pass est insuffisant pour réserver cette offre.")]
    UserHasInsufficientFunds,
    /// The digital cap would be exceeded.
    #[error("Le plafond de {cap} € pour les offres numériques ne vous permet pas de réserver cette offre.")]
    DigitalExpenseLimitHasBeenReached {
        /// Cap of the deposit.
        cap: Cents,
    },
    /// The physical goods cap would be exceeded.
    #[error("Le plafond de {cap} € pour les biens culturels ne vous permet pas de réserver cette offre.")]
    PhysicalExpenseLimitHasBeenReached {
        /// Cap of the deposit.
        cap: Cents,
    },
    /// The booking was already used.
    #[error("Impossible d'annuler une réservation consommée")]
    BookingIsAlreadyUsed,
    /// The booking was already cancelled.
    #[error("Cette réservation a été annulée")]
    BookingIsAlreadyCancelled,
    /// The booking was already reimbursed to the offerer.
    #[error("Cette réservation a été remboursée")]
    BookingIsAlreadyRefunded,
    /// The booking has not been used yet.
    #[error("Cette contremarque n'a pas encore été validée")]
    BookingIsNotUsed,
    /// The beneficiary may still cancel this event booking.
    #[error(
        "Cette réservation a été effectuée le {booked_on}. Veuillez attendre jusqu’au {confirmable_from} pour valider la contremarque."
    )]
    BookingIsNotConfirmed {
        /// Booking date, formatted `dd/mm/YYYY`.
        booked_on: String,
        /// Cancellation limit date, formatted `dd/mm/YYYY`.
        confirmable_from: String,
    },
    /// The beneficiary cancellation window is closed.
    #[error(
        "Impossible d'annuler une réservation plus de 48h après l'avoir réservée et moins de 48h avant le début de l'évènement"
    )]
    CannotCancelConfirmedBooking,
    /// The deposit the booking was paid with has expired.
    #[error("Le crédit du bénéficiaire a expiré")]
    BookingDepositCreditExpired,
    /// The booking was already priced and cannot be cancelled.
    #[error("Cette réservation a déjà été valorisée et ne peut plus être annulée")]
    NonCancellablePricing,
    /// Every activation code of the stock is taken or expired.
    #[error("Ce stock ne contient plus de code d'activation disponible.")]
    NoActivationCodeAvailable,
    /// Another booking charged the deposit while this one was checked.
    #[error("Une autre réservation est en cours sur votre compte, veuillez réessayer.")]
    ConcurrentBooking,
    /// No unused booking token could be generated.
    #[error("Impossible de générer une contremarque unique")]
    TokenGenerationExhausted,
}

impl BookingError {
    /// Field the message applies to.
    pub const fn field(&self) -> &'static str {
        match self {
            Self::StockDoesNotExist => "stockId",
            Self::BookingDoesntExist => "bookingId",
            Self::OfferIsAlreadyBooked | Self::OfferCategoryNotBookableByUser => "offerId",
            Self::QuantityIsNotOne | Self::DuoQuantityIsInvalid => "quantity",
            Self::StockIsNotBookable | Self::NoActivationCodeAvailable => "stock",
            Self::CannotBookFreeOffers => "cannotBookFreeOffers",
            Self::UserHasInsufficientFunds => "insufficientFunds",
            Self::DigitalExpenseLimitHasBeenReached { .. }
            | Self::PhysicalExpenseLimitHasBeenReached { .. } => "global",
            Self::BookingIsAlreadyRefunded => "payment",
            Self::TokenGenerationExhausted => "token",
            Self::BookingIsAlreadyUsed
            | Self::BookingIsAlreadyCancelled
            | Self::BookingIsNotUsed
            | Self::BookingIsNotConfirmed { .. }
            | Self::CannotCancelConfirmedBooking
            | Self::BookingDepositCreditExpired
            | Self::NonCancellablePricing
            | Self::ConcurrentBooking => "booking",
        }
    }

    /// Field-keyed error map, e.g. `{"stock": ["Ce stock n'est pas réservable"]}`.
    pub fn errors(&self) -> Value {
        json!({ self.field(): [self.to_string()] })
    }

    /// Category of the violation.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::StockDoesNotExist | Self::BookingDoesntExist => ErrorCode::NotFound,
            Self::BookingIsAlreadyUsed
            | Self::BookingIsAlreadyCancelled
            | Self::BookingIsAlreadyRefunded => ErrorCode::Gone,
            Self::BookingIsNotConfirmed { .. }
            | Self::CannotCancelConfirmedBooking
            | Self::BookingDepositCreditExpired => ErrorCode::Forbidden,
            Self::NonCancellablePricing | Self::ConcurrentBooking => ErrorCode::Conflict,
            Self::TokenGenerationExhausted => ErrorCode::InternalError,
            _ => ErrorCode::InvalidRequest,
        }
    }
}

impl From<BookingError> for Error {
    fn from(value: BookingError) -> Self {
        Self::new(value.code(), value.to_string()).with_details(value.errors())
    }
}
