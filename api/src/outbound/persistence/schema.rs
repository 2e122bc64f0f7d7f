//! Diesel table definitions for the tables the adapters touch.
//!
//! Only the columns read or written by this crate are declared. The
//! database schema itself is owned by the platform's migrations; keep these
//! definitions in step with it. Money columns hold integer cents.

diesel::table! {
    /// Individual bookings.
    booking (id) {
        id -> Int8,
        user_id -> Int8,
        stock_id -> Int8,
        offer_id -> Int8,
        venue_id -> Int8,
        offerer_id -> Int8,
        deposit_id -> Nullable<Int8>,
        quantity -> Int4,
        amount_cents -> Int8,
        token -> Varchar,
        status -> Varchar,
        date_created -> Timestamptz,
        date_used -> Nullable<Timestamptz>,
        cancellation_date -> Nullable<Timestamptz>,
        cancellation_reason -> Nullable<Varchar>,
        cancellation_limit_date -> Nullable<Timestamptz>,
        validation_author_type -> Nullable<Varchar>,
        reimbursement_date -> Nullable<Timestamptz>,
        display_as_ended -> Bool,
        price_category_label -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Bookable quantities of an offer.
    stock (id) {
        id -> Int8,
        offer_id -> Int8,
        price_cents -> Int8,
        quantity -> Nullable<Int4>,
        dn_booked_quantity -> Int4,
        beginning_datetime -> Nullable<Timestamptz>,
        booking_limit_datetime -> Nullable<Timestamptz>,
        is_soft_deleted -> Bool,
        id_at_providers -> Nullable<Varchar>,
        raw_provider_quantity -> Nullable<Int4>,
        last_provider_id -> Nullable<Int8>,
        date_modified -> Timestamptz,
    }
}

diesel::table! {
    /// Offers published by venues.
    offer (id) {
        id -> Int8,
        venue_id -> Int8,
        product_id -> Nullable<Int8>,
        subcategory_id -> Varchar,
        name -> Varchar,
        is_duo -> Bool,
        is_active -> Bool,
        validation -> Varchar,
        url -> Nullable<Varchar>,
        ean -> Nullable<Varchar>,
        last_provider_id -> Nullable<Int8>,
        id_at_provider -> Nullable<Varchar>,
        date_created -> Timestamptz,
        date_modified -> Timestamptz,
    }
}

diesel::table! {
    /// Venues of an offerer.
    venue (id) {
        id -> Int8,
        managing_offerer_id -> Int8,
        siret -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Catalogue products offers are created from.
    product (id) {
        id -> Int8,
        name -> Varchar,
        subcategory_id -> Varchar,
        ean -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Platform users.
    users (id) {
        id -> Int8,
        email -> Varchar,
        roles -> Array<Text>,
        birth_date -> Nullable<Date>,
    }
}

diesel::table! {
    /// Money granted to beneficiaries.
    deposit (id) {
        id -> Int8,
        user_id -> Int8,
        #[sql_name = "type"]
        deposit_type -> Varchar,
        version -> Int2,
        amount_cents -> Int8,
        source -> Varchar,
        date_created -> Timestamptz,
        expiration_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Birthday top-ups of underage deposits.
    recredit (id) {
        id -> Int8,
        deposit_id -> Int8,
        recredit_type -> Varchar,
        amount_cents -> Int8,
        date_created -> Timestamptz,
    }
}

diesel::table! {
    /// Reimbursement bookkeeping events.
    finance_event (id) {
        id -> Int8,
        booking_id -> Nullable<Int8>,
        collective_booking_id -> Nullable<Int8>,
        motive -> Varchar,
        status -> Varchar,
        value_date -> Timestamptz,
        creation_date -> Timestamptz,
    }
}

diesel::table! {
    /// Prices computed from finance events.
    pricing (id) {
        id -> Int8,
        event_id -> Int8,
        status -> Varchar,
    }
}

diesel::table! {
    /// Bookings made by educational institutions.
    collective_booking (id) {
        id -> Int8,
        collective_stock_id -> Int8,
        venue_id -> Int8,
        offerer_id -> Int8,
        educational_institution_uai -> Varchar,
        status -> Varchar,
        date_used -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Collective event dates.
    collective_stock (id) {
        id -> Int8,
        beginning_datetime -> Timestamptz,
    }
}

diesel::table! {
    /// Links between venues and the providers synchronising them.
    venue_provider (id) {
        id -> Int8,
        venue_id -> Int8,
        provider_id -> Int8,
        venue_id_at_offer_provider -> Nullable<Varchar>,
        is_active -> Bool,
    }
}

diesel::table! {
    /// Activation codes attached to digital stocks.
    activation_code (id) {
        id -> Int8,
        code -> Varchar,
        stock_id -> Int8,
        booking_id -> Nullable<Int8>,
        expiration_date -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(booking -> offer (offer_id));
diesel::joinable!(booking -> stock (stock_id));
diesel::joinable!(stock -> offer (offer_id));
diesel::joinable!(offer -> venue (venue_id));
diesel::joinable!(recredit -> deposit (deposit_id));
diesel::joinable!(pricing -> finance_event (event_id));
diesel::joinable!(collective_booking -> collective_stock (collective_stock_id));

diesel::allow_tables_to_appear_in_same_query!(
    activation_code,
    booking,
    collective_booking,
    collective_stock,
    deposit,
    finance_event,
    offer,
    pricing,
    product,
    recredit,
    stock,
    users,
    venue,
    venue_provider,
);
