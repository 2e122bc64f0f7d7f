//! In-memory adapters for exercising services end to end without
//! PostgreSQL or Redis.
//!
//! [`InMemoryMarketplace`] keeps stocks, users, deposits, bookings,
//! activation codes and finance events behind one mutex. Each booking write
//! validates everything before mutating anything, so a failed write leaves
//! the store untouched the way a rolled back transaction does.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::beneficiary::Beneficiary;
use crate::domain::booking::{Booking, BookingStatus, NewBooking};
use crate::domain::deposit::{Deposit, ExpenseLine, GrantedDeposit, RecreditType};
use crate::domain::finance::{FinanceEvent, FinanceEventStatus, FinanceJournal, PricingStatus};
use crate::domain::indexing::IndexationReason;
use crate::domain::notification::Notification;
use crate::domain::offer::BookableStock;
use crate::domain::ports::{
    BeneficiaryRepository, BeneficiaryRepositoryError, BookingRepository, BookingRepositoryError,
    DepositRepository, DepositRepositoryError, FinanceEventRepository,
    FinanceEventRepositoryError, JobDispatchError, NotificationQueue, OfferIndexer,
    OfferIndexerError, StockRepository, StockRepositoryError,
};
use crate::domain::{
    BookingId, Cents, DepositId, FinanceEventId, OfferId, StockId, UserId, VenueId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone)]
struct ActivationCode {
    stock_id: StockId,
    code: String,
    booking_id: Option<BookingId>,
    expiration_date: Option<DateTime<Utc>>,
}

impl ActivationCode {
    fn is_free(&self, now: DateTime<Utc>) -> bool {
        self.booking_id.is_none() && self.expiration_date.is_none_or(|expires| expires > now)
    }
}

#[derive(Debug, Default)]
struct State {
    stocks: BTreeMap<StockId, BookableStock>,
    users: BTreeMap<UserId, Beneficiary>,
    deposits: BTreeMap<DepositId, Deposit>,
    bookings: BTreeMap<BookingId, Booking>,
    activation_codes: Vec<ActivationCode>,
    finance_events: BTreeMap<FinanceEventId, FinanceEvent>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id + 100
    }

    fn current_deposit(&self, user_id: UserId) -> Option<Deposit> {
        self.deposits
            .values()
            .filter(|deposit| deposit.user_id == user_id)
            .max_by_key(|deposit| (deposit.date_created, deposit.id))
            .cloned()
    }

    fn stock_mut(&mut self, stock_id: StockId) -> Result<&mut BookableStock, BookingRepositoryError> {
        self.stocks
            .get_mut(&stock_id)
            .ok_or_else(|| BookingRepositoryError::query(format!("stock {stock_id} missing")))
    }

    fn stored_booking(&self, booking_id: BookingId) -> Result<&Booking, BookingRepositoryError> {
        self.bookings
            .get(&booking_id)
            .ok_or_else(|| BookingRepositoryError::missing(booking_id.get()))
    }

    fn check_journal(&self, journal: &FinanceJournal) -> Result<(), BookingRepositoryError> {
        let Some(event_id) = journal.cancelled_event else {
            return Ok(());
        };
        let event = self.finance_events.get(&event_id).ok_or_else(|| {
            BookingRepositoryError::query(format!("finance event {event_id} missing"))
        })?;
        if event.pricing_status.is_some_and(PricingStatus::is_settled) {
            return Err(BookingRepositoryError::settled_pricing(event_id.get()));
        }
        Ok(())
    }

    fn apply_journal(&mut self, booking: &Booking, journal: &FinanceJournal) {
        if let Some(event) = journal
            .cancelled_event
            .and_then(|event_id| self.finance_events.get_mut(&event_id))
        {
            event.status = FinanceEventStatus::Cancelled;
            event.pricing_status = None;
        }
        for event in journal.events_for(booking) {
            let id = FinanceEventId::new(self.next_id());
            self.finance_events.insert(
                id,
                FinanceEvent {
                    id,
                    booking_id: event.booking_id,
                    collective_booking_id: event.collective_booking_id,
                    motive: event.motive,
                    status: event.status,
                    value_date: event.value_date,
                    pricing_status: None,
                },
            );
        }
    }

    fn recheck_user_bookings(&self, new: &NewBooking) -> Result<(), BookingRepositoryError> {
        let live = || {
            self.bookings
                .values()
                .filter(|booking| booking.status != BookingStatus::Cancelled)
        };
        if live().any(|booking| {
            booking.user_id == new.user_id && booking.offer_id == new.offer_id
        }) {
            return Err(BookingRepositoryError::offer_already_booked(new.offer_id.get()));
        }
        if let Some(deposit_id) = new.deposit_id {
            let spent: Cents = live()
                .filter(|booking| booking.deposit_id == Some(deposit_id))
                .map(Booking::total_amount)
                .sum();
            if spent > new.deposit_spent {
                return Err(BookingRepositoryError::deposit_spending_changed(deposit_id.get()));
            }
        }
        Ok(())
    }

    fn free_activation_code(
        &self,
        stock_id: StockId,
        now: DateTime<Utc>,
    ) -> Result<usize, BookingRepositoryError> {
        self.activation_codes
            .iter()
            .position(|code| code.stock_id == stock_id && code.is_free(now))
            .ok_or_else(|| BookingRepositoryError::no_activation_code(stock_id.get()))
    }
}

/// Shared in-memory store implementing the booking-side ports.
#[derive(Debug, Default)]
pub struct InMemoryMarketplace {
    state: Mutex<State>,
}

impl InMemoryMarketplace {
    /// Empty marketplace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stock with its offer.
    pub fn add_stock(&self, stock: BookableStock) {
        lock(&self.state).stocks.insert(stock.stock.id, stock);
    }

    /// Register a user; their deposit, if any, is stored alongside.
    pub fn add_user(&self, user: Beneficiary) {
        let mut state = lock(&self.state);
        if let Some(deposit) = &user.deposit {
            state.deposits.insert(deposit.id, deposit.clone());
        }
        state.users.insert(user.id, user);
    }

    /// Store a booking as is.
    pub fn add_booking(&self, booking: Booking) {
        lock(&self.state).bookings.insert(booking.id, booking);
    }

    /// Upload an activation code for a stock and flag the stock as using
    /// codes.
    pub fn add_activation_code(
        &self,
        stock_id: StockId,
        code: &str,
        expiration_date: Option<DateTime<Utc>>,
    ) {
        let mut state = lock(&self.state);
        if let Some(stock) = state.stocks.get_mut(&stock_id) {
            stock.has_activation_codes = true;
        }
        state.activation_codes.push(ActivationCode {
            stock_id,
            code: code.to_owned(),
            booking_id: None,
            expiration_date,
        });
    }

    /// Activation code handed to a booking.
    pub fn activation_code_of(&self, booking_id: BookingId) -> Option<String> {
        lock(&self.state)
            .activation_codes
            .iter()
            .find(|code| code.booking_id == Some(booking_id))
            .map(|code| code.code.clone())
    }

    /// Attach a pricing to the latest active event of a booking.
    pub fn price_latest_event(&self, booking_id: BookingId, pricing: PricingStatus) {
        let mut state = lock(&self.state);
        if let Some(event) = state
            .finance_events
            .values_mut()
            .rev()
            .find(|event| {
                event.booking_id == Some(booking_id) && event.status != FinanceEventStatus::Cancelled
            })
        {
            event.status = FinanceEventStatus::Priced;
            event.pricing_status = Some(pricing);
        }
    }

    /// Current state of a stock.
    pub fn stock(&self, stock_id: StockId) -> Option<BookableStock> {
        lock(&self.state).stocks.get(&stock_id).cloned()
    }

    /// Current state of a booking.
    pub fn booking(&self, booking_id: BookingId) -> Option<Booking> {
        lock(&self.state).bookings.get(&booking_id).cloned()
    }

    /// All bookings, ordered by id.
    pub fn bookings(&self) -> Vec<Booking> {
        lock(&self.state).bookings.values().cloned().collect()
    }

    /// All finance events, ordered by id.
    pub fn finance_events(&self) -> Vec<FinanceEvent> {
        lock(&self.state).finance_events.values().cloned().collect()
    }

    /// Deposits of a user, most recent first.
    pub fn deposits_of(&self, user_id: UserId) -> Vec<Deposit> {
        let state = lock(&self.state);
        let mut deposits: Vec<Deposit> = state
            .deposits
            .values()
            .filter(|deposit| deposit.user_id == user_id)
            .cloned()
            .collect();
        deposits.sort_by(|a, b| b.date_created.cmp(&a.date_created).then(b.id.cmp(&a.id)));
        deposits
    }
}

#[async_trait]
impl BookingRepository for InMemoryMarketplace {
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingRepositoryError> {
        Ok(self.booking(id))
    }

    async fn token_exists(&self, token: &str) -> Result<bool, BookingRepositoryError> {
        Ok(lock(&self.state)
            .bookings
            .values()
            .any(|booking| booking.token == token))
    }

    async fn has_live_booking_for_offer(
        &self,
        user_id: UserId,
        offer_id: OfferId,
    ) -> Result<bool, BookingRepositoryError> {
        Ok(lock(&self.state).bookings.values().any(|booking| {
            booking.user_id == user_id
                && booking.offer_id == offer_id
                && booking.status != BookingStatus::Cancelled
        }))
    }

    async fn venue_has_bookings(&self, venue_id: VenueId) -> Result<bool, BookingRepositoryError> {
        Ok(lock(&self.state)
            .bookings
            .values()
            .any(|booking| booking.venue_id == venue_id))
    }

    async fn insert_with_reservation(
        &self,
        new: &NewBooking,
        journal: &FinanceJournal,
    ) -> Result<Booking, BookingRepositoryError> {
        let mut state = lock(&self.state);
        state.check_journal(journal)?;
        state.recheck_user_bookings(new)?;
        let code_index = if new.claim_activation_code {
            Some(state.free_activation_code(new.stock_id, new.date_created)?)
        } else {
            None
        };
        let stock = &mut state.stock_mut(new.stock_id)?.stock;
        if stock
            .remaining_quantity()
            .is_some_and(|remaining| remaining < new.quantity)
        {
            return Err(BookingRepositoryError::insufficient_stock(new.stock_id.get()));
        }
        stock.dn_booked_quantity += new.quantity;

        let booking = Booking {
            id: BookingId::new(state.next_id()),
            user_id: new.user_id,
            stock_id: new.stock_id,
            offer_id: new.offer_id,
            venue_id: new.venue_id,
            offerer_id: new.offerer_id,
            deposit_id: new.deposit_id,
            quantity: new.quantity,
            amount: new.amount,
            token: new.token.clone(),
            status: new.status,
            date_created: new.date_created,
            date_used: new.date_used,
            cancellation_date: None,
            cancellation_reason: None,
            cancellation_limit_date: new.cancellation_limit_date,
            validation_author_type: new.validation_author_type,
            reimbursement_date: None,
            display_as_ended: false,
            price_category_label: None,
        };
        if let Some(code) = code_index.and_then(|index| state.activation_codes.get_mut(index)) {
            code.booking_id = Some(booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());
        state.apply_journal(&booking, journal);
        Ok(booking)
    }

    async fn save_status(
        &self,
        booking: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        let mut state = lock(&self.state);
        state.stored_booking(booking.id)?;
        state.check_journal(journal)?;
        state.bookings.insert(booking.id, booking.clone());
        state.apply_journal(booking, journal);
        Ok(())
    }

    async fn save_cancellation(
        &self,
        booking: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        let mut state = lock(&self.state);
        if state.stored_booking(booking.id)?.status == BookingStatus::Cancelled {
            return Err(BookingRepositoryError::missing(booking.id.get()));
        }
        state.check_journal(journal)?;
        state.stock_mut(booking.stock_id)?;

        let holds_code = state
            .activation_codes
            .iter()
            .any(|code| code.booking_id == Some(booking.id));
        let stock = &mut state.stock_mut(booking.stock_id)?.stock;
        stock.dn_booked_quantity = stock.dn_booked_quantity.saturating_sub(booking.quantity);
        if holds_code {
            stock.quantity = stock.quantity.map(|quantity| quantity.saturating_sub(1));
        }
        state.bookings.insert(booking.id, booking.clone());
        state.apply_journal(booking, journal);
        Ok(())
    }

    async fn save_uncancellation(
        &self,
        booking: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        let mut state = lock(&self.state);
        if state.stored_booking(booking.id)?.status != BookingStatus::Cancelled {
            return Err(BookingRepositoryError::missing(booking.id.get()));
        }
        state.check_journal(journal)?;
        state.stock_mut(booking.stock_id)?.stock.dn_booked_quantity += booking.quantity;
        state.bookings.insert(booking.id, booking.clone());
        state.apply_journal(booking, journal);
        Ok(())
    }

    async fn list_live_for_stock(
        &self,
        stock_id: StockId,
    ) -> Result<Vec<Booking>, BookingRepositoryError> {
        Ok(lock(&self.state)
            .bookings
            .values()
            .filter(|booking| {
                booking.stock_id == stock_id && booking.status != BookingStatus::Cancelled
            })
            .cloned()
            .collect())
    }

    async fn update_cancellation_limit_dates(
        &self,
        stock_id: StockId,
        limit: DateTime<Utc>,
    ) -> Result<usize, BookingRepositoryError> {
        let mut state = lock(&self.state);
        let mut updated = 0;
        for booking in state.bookings.values_mut().filter(|booking| {
            booking.stock_id == stock_id && booking.status != BookingStatus::Cancelled
        }) {
            booking.cancellation_limit_date = Some(limit);
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl StockRepository for InMemoryMarketplace {
    async fn find_bookable(
        &self,
        stock_id: StockId,
    ) -> Result<Option<BookableStock>, StockRepositoryError> {
        Ok(self.stock(stock_id))
    }
}

#[async_trait]
impl BeneficiaryRepository for InMemoryMarketplace {
    async fn find_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<Beneficiary>, BeneficiaryRepositoryError> {
        let state = lock(&self.state);
        Ok(state.users.get(&user_id).map(|user| Beneficiary {
            deposit: state.current_deposit(user_id),
            ..user.clone()
        }))
    }

    async fn list_expense_lines(
        &self,
        deposit_id: DepositId,
    ) -> Result<Vec<ExpenseLine>, BeneficiaryRepositoryError> {
        let state = lock(&self.state);
        Ok(state
            .bookings
            .values()
            .filter(|booking| {
                booking.deposit_id == Some(deposit_id) && booking.status != BookingStatus::Cancelled
            })
            .filter_map(|booking| {
                let offer = &state.stocks.get(&booking.stock_id)?.offer;
                Some(ExpenseLine {
                    amount: booking.amount,
                    quantity: booking.quantity,
                    subcategory_id: offer.subcategory_id.clone(),
                    is_digital_offer: offer.is_digital(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl DepositRepository for InMemoryMarketplace {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Deposit>, DepositRepositoryError> {
        Ok(self.deposits_of(user_id))
    }

    async fn insert(
        &self,
        user_id: UserId,
        granted: &GrantedDeposit,
        _source: &str,
        now: DateTime<Utc>,
    ) -> Result<Deposit, DepositRepositoryError> {
        let mut state = lock(&self.state);
        let deposit = Deposit {
            id: DepositId::new(state.next_id()),
            user_id,
            deposit_type: granted.deposit_type,
            version: granted.version,
            amount: granted.amount,
            date_created: now,
            expiration_date: Some(granted.expiration_date),
            recredits: Vec::new(),
        };
        state.deposits.insert(deposit.id, deposit.clone());
        Ok(deposit)
    }

    async fn update_expiration(
        &self,
        deposit_id: DepositId,
        expiration_date: DateTime<Utc>,
    ) -> Result<(), DepositRepositoryError> {
        let mut state = lock(&self.state);
        let deposit = state
            .deposits
            .get_mut(&deposit_id)
            .ok_or_else(|| DepositRepositoryError::query(format!("deposit {deposit_id} missing")))?;
        deposit.expiration_date = Some(expiration_date);
        Ok(())
    }

    async fn add_recredit(
        &self,
        deposit_id: DepositId,
        recredit: RecreditType,
        _now: DateTime<Utc>,
    ) -> Result<(), DepositRepositoryError> {
        let mut state = lock(&self.state);
        let deposit = state
            .deposits
            .get_mut(&deposit_id)
            .ok_or_else(|| DepositRepositoryError::query(format!("deposit {deposit_id} missing")))?;
        deposit.amount = deposit.amount + recredit.amount();
        deposit.recredits.push(recredit);
        Ok(())
    }
}

#[async_trait]
impl FinanceEventRepository for InMemoryMarketplace {
    async fn find_latest_active_event(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<FinanceEvent>, FinanceEventRepositoryError> {
        Ok(lock(&self.state)
            .finance_events
            .values()
            .rev()
            .find(|event| {
                event.booking_id == Some(booking_id) && event.status != FinanceEventStatus::Cancelled
            })
            .cloned())
    }
}

/// Indexer remembering every request.
#[derive(Debug, Default)]
pub struct RecordingIndexer {
    calls: Mutex<Vec<(Vec<OfferId>, IndexationReason)>>,
}

impl RecordingIndexer {
    /// Requests received so far.
    pub fn calls(&self) -> Vec<(Vec<OfferId>, IndexationReason)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl OfferIndexer for RecordingIndexer {
    async fn index_offer_ids(
        &self,
        offer_ids: &[OfferId],
        reason: IndexationReason,
    ) -> Result<(), OfferIndexerError> {
        lock(&self.calls).push((offer_ids.to_vec(), reason));
        Ok(())
    }
}

/// Queue remembering every notification.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingQueue {
    /// Notifications queued so far.
    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn enqueue(&self, notification: &Notification) -> Result<(), JobDispatchError> {
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}
