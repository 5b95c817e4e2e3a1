// Tier quota policy: creation admission checks and downgrade victim
// selection. Pure functions over repository listings; the scheduler turns
// the selection into staged deletion jobs.

use thiserror::Error;

use crate::models::link::{LinkCounts, LinkRecord};
use crate::models::subscription::TierQuota;

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// Permanent links are not available on this tier.
    #[error("need subscribe")]
    NeedSubscribe,

    /// A per-category or total quota is already full.
    #[error("limit exceeded")]
    LimitExceeded,
}

// =============================================================================
// CREATION ADMISSION
// =============================================================================

/// Whether a user with `counts` existing links may create one more under
/// `quota`, given the requested link shape.
pub fn check_creation(
    counts: &LinkCounts,
    quota: &TierQuota,
    wants_permanent: bool,
    wants_custom: bool,
) -> Result<(), AdmissionError> {
    if wants_permanent {
        if quota.max_permanent == 0 {
            return Err(AdmissionError::NeedSubscribe);
        }
        if counts.permanent >= quota.max_permanent {
            return Err(AdmissionError::LimitExceeded);
        }
    }

    if wants_custom && counts.custom >= quota.max_custom {
        return Err(AdmissionError::LimitExceeded);
    }

    if counts.all >= quota.max_all {
        return Err(AdmissionError::LimitExceeded);
    }

    Ok(())
}

// =============================================================================
// DOWNGRADE VICTIM SELECTION
// =============================================================================

/// Select the short codes to delete so that `links` fits inside `quota`
/// once the owner's subscription window elapses.
///
/// Selection rules, in order:
/// 1. every permanent link beyond the permanent quota (all of them on the
///    free tier), in listing order;
/// 2. custom links in excess of the custom quota, in listing order;
/// 3. default links until the surviving total fits the all-links quota,
///    again in listing order.
///
/// Categories are partitioned from the listing itself: a permanent link
/// with a custom alias counts as permanent only. Repository count
/// conventions never feed this arithmetic. Listing order is authoritative;
/// nothing here reorders it.
pub fn select_downgrade_victims(links: &[LinkRecord], quota: &TierQuota) -> Vec<String> {
    let mut permanent_links: Vec<&LinkRecord> = Vec::new();
    let mut custom_links: Vec<&LinkRecord> = Vec::new();
    let mut default_links: Vec<&LinkRecord> = Vec::new();

    for link in links {
        if link.is_permanent {
            permanent_links.push(link);
        } else if link.is_custom {
            custom_links.push(link);
        } else {
            default_links.push(link);
        }
    }

    let mut victims = Vec::new();

    let excess_permanent = permanent_links.len().saturating_sub(quota.max_permanent);
    for link in permanent_links.iter().take(excess_permanent) {
        victims.push(link.short_code.clone());
    }

    let excess_custom = custom_links.len().saturating_sub(quota.max_custom);
    for link in custom_links.iter().take(excess_custom) {
        victims.push(link.short_code.clone());
    }

    // Everything not already marked still counts against the total quota.
    let surviving = default_links.len() + custom_links.len() - excess_custom;
    let excess_all = surviving.saturating_sub(quota.max_all);
    for link in default_links.iter().take(excess_all) {
        victims.push(link.short_code.clone());
    }

    victims
}
