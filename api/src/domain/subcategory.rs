//! Offer subcategories and the booking rules attached to them.
//!
//! The catalogue knows many more subcategories than the ones listed here;
//! this table only carries those whose flags change booking behaviour.
//! Unknown identifiers resolve to `None` and are treated as plain,
//! uncapped, non-expiring things.

/// Static description of a subcategory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subcategory {
    /// Stable identifier, e.g. `LIVRE_PAPIER`.
    pub id: &'static str,
    /// Stocks carry a beginning datetime.
    pub is_event: bool,
    /// Counts towards the digital spending cap when the offer is online.
    pub is_digital_deposit: bool,
    /// Counts towards the physical goods cap when the offer is not online.
    pub is_physical_deposit: bool,
    /// Unused bookings are cancelled automatically after a delay.
    pub can_expire: bool,
    /// Paper books expire sooner than other goods.
    pub is_book: bool,
    /// Online offers of this kind are used as soon as they are booked.
    pub is_automatically_used: bool,
    /// Video games are closed to underage beneficiaries.
    pub is_video_game: bool,
    /// Underage beneficiaries may book paid online offers of this kind.
    pub bookable_digital_by_underage: bool,
    /// Bookings stay listed as ongoing after use until archived.
    pub display_even_if_used: bool,
}

const fn base(id: &'static str) -> Subcategory {
    Subcategory {
        id,
        is_event: false,
        is_digital_deposit: false,
        is_physical_deposit: false,
        can_expire: false,
        is_book: false,
        is_automatically_used: false,
        is_video_game: false,
        bookable_digital_by_underage: false,
        display_even_if_used: false,
    }
}

const fn event(id: &'static str) -> Subcategory {
    let mut sub = base(id);
    sub.is_event = true;
    sub
}

const fn physical_good(id: &'static str) -> Subcategory {
    let mut sub = base(id);
    sub.is_physical_deposit = true;
    sub.can_expire = true;
    sub
}

const fn digital_good(id: &'static str) -> Subcategory {
    let mut sub = base(id);
    sub.is_digital_deposit = true;
    sub
}

const fn subscription(id: &'static str) -> Subcategory {
    let mut sub = digital_good(id);
    sub.is_automatically_used = true;
    sub.display_even_if_used = true;
    sub
}

/// Paper books.
pub const LIVRE_PAPIER: Subcategory = {
    let mut sub = physical_good("LIVRE_PAPIER");
    sub.is_book = true;
    sub
};
/// E-books.
pub const LIVRE_NUMERIQUE: Subcategory = {
    let mut sub = base("LIVRE_NUMERIQUE");
    sub.is_automatically_used = true;
    sub.bookable_digital_by_underage = true;
    sub
};
/// Physical audio books.
pub const LIVRE_AUDIO_PHYSIQUE: Subcategory = physical_good("LIVRE_AUDIO_PHYSIQUE");
/// Cinema screenings.
pub const SEANCE_CINE: Subcategory = event("SEANCE_CINE");
/// Open air cinema.
pub const CINE_PLEIN_AIR: Subcategory = event("CINE_PLEIN_AIR");
/// Unlimited cinema cards.
pub const CARTE_CINE_ILLIMITE: Subcategory = {
    let mut sub = base("CARTE_CINE_ILLIMITE");
    sub.display_even_if_used = true;
    sub
};
/// Video on demand.
pub const VOD: Subcategory = {
    let mut sub = digital_good("VOD");
    sub.is_automatically_used = true;
    sub
};
/// Video streaming subscriptions.
pub const ABO_PLATEFORME_VIDEO: Subcategory = subscription("ABO_PLATEFORME_VIDEO");
/// Music streaming subscriptions.
pub const ABO_PLATEFORME_MUSIQUE: Subcategory = subscription("ABO_PLATEFORME_MUSIQUE");
/// E-book subscriptions.
pub const ABO_LIVRE_NUMERIQUE: Subcategory = {
    let mut sub = subscription("ABO_LIVRE_NUMERIQUE");
    sub.bookable_digital_by_underage = true;
    sub
};
/// Online press subscriptions.
pub const ABO_PRESSE_EN_LIGNE: Subcategory = {
    let mut sub = subscription("ABO_PRESSE_EN_LIGNE");
    sub.bookable_digital_by_underage = true;
    sub
};
/// Music downloads.
pub const TELECHARGEMENT_MUSIQUE: Subcategory = {
    let mut sub = digital_good("TELECHARGEMENT_MUSIQUE");
    sub.is_automatically_used = true;
    sub
};
/// Podcasts.
pub const PODCAST: Subcategory = {
    let mut sub = base("PODCAST");
    sub.bookable_digital_by_underage = true;
    sub
};
/// Video game subscriptions.
pub const ABO_JEU_VIDEO: Subcategory = {
    let mut sub = digital_good("ABO_JEU_VIDEO");
    sub.is_video_game = true;
    sub
};
/// Online games.
pub const JEU_EN_LIGNE: Subcategory = {
    let mut sub = digital_good("JEU_EN_LIGNE");
    sub.is_video_game = true;
    sub
};
/// Boxed video games.
pub const JEU_SUPPORT_PHYSIQUE: Subcategory = {
    let mut sub = physical_good("JEU_SUPPORT_PHYSIQUE");
    sub.is_video_game = true;
    sub
};
/// DVDs and Blu-rays.
pub const SUPPORT_PHYSIQUE_FILM: Subcategory = physical_good("SUPPORT_PHYSIQUE_FILM");
/// Music CDs.
pub const SUPPORT_PHYSIQUE_MUSIQUE_CD: Subcategory = physical_good("SUPPORT_PHYSIQUE_MUSIQUE_CD");
/// Musical instruments.
pub const ACHAT_INSTRUMENT: Subcategory = physical_good("ACHAT_INSTRUMENT");
/// Art supplies.
pub const MATERIEL_ART_CREATIF: Subcategory = physical_good("MATERIEL_ART_CREATIF");
/// Works of art.
pub const OEUVRE_ART: Subcategory = base("OEUVRE_ART");
/// Concerts.
pub const CONCERT: Subcategory = event("CONCERT");
/// Music festivals.
pub const FESTIVAL_MUSIQUE: Subcategory = event("FESTIVAL_MUSIQUE");
/// Live shows.
pub const SPECTACLE_REPRESENTATION: Subcategory = event("SPECTACLE_REPRESENTATION");
/// Art workshops.
pub const ATELIER_PRATIQUE_ART: Subcategory = event("ATELIER_PRATIQUE_ART");
/// Guided tours.
pub const VISITE_GUIDEE: Subcategory = event("VISITE_GUIDEE");
/// Museum entries.
pub const VISITE: Subcategory = base("VISITE");
/// Virtual tours.
pub const VISITE_VIRTUELLE: Subcategory = {
    let mut sub = base("VISITE_VIRTUELLE");
    sub.bookable_digital_by_underage = true;
    sub
};
/// Museum passes.
pub const CARTE_MUSEE: Subcategory = {
    let mut sub = base("CARTE_MUSEE");
    sub.display_even_if_used = true;
    sub
};

/// Every subcategory the booking rules know about.
pub const ALL_SUBCATEGORIES: &[Subcategory] = &[
    LIVRE_PAPIER,
    LIVRE_NUMERIQUE,
    LIVRE_AUDIO_PHYSIQUE,
    SEANCE_CINE,
    CINE_PLEIN_AIR,
    CARTE_CINE_ILLIMITE,
    VOD,
    ABO_PLATEFORME_VIDEO,
    ABO_PLATEFORME_MUSIQUE,
    ABO_LIVRE_NUMERIQUE,
    ABO_PRESSE_EN_LIGNE,
    TELECHARGEMENT_MUSIQUE,
    PODCAST,
    ABO_JEU_VIDEO,
    JEU_EN_LIGNE,
    JEU_SUPPORT_PHYSIQUE,
    SUPPORT_PHYSIQUE_FILM,
    SUPPORT_PHYSIQUE_MUSIQUE_CD,
    ACHAT_INSTRUMENT,
    MATERIEL_ART_CREATIF,
    OEUVRE_ART,
    CONCERT,
    FESTIVAL_MUSIQUE,
    SPECTACLE_REPRESENTATION,
    ATELIER_PRATIQUE_ART,
    VISITE_GUIDEE,
    VISITE,
    VISITE_VIRTUELLE,
    CARTE_MUSEE,
];

/// Look a subcategory up by identifier.
pub fn find(id: &str) -> Option<&'static Subcategory> {
    ALL_SUBCATEGORIES.iter().find(|sub| sub.id == id)
}

/// Identifiers of subcategories matching `predicate`.
pub fn ids_where(predicate: impl Fn(&Subcategory) -> bool) -> Vec<&'static str> {
    ALL_SUBCATEGORIES
        .iter()
        .filter(|sub| predicate(sub))
        .map(|sub| sub.id)
        .collect()
}
