//! `dojo-auth`: the local identity model.
//!
//! Everything here is pure: raw backend rows go in, a normalized
//! [`IdentityRecord`] with derived authorization queries comes out. No IO.

pub mod belt;
pub mod identity;
pub mod membership;
pub mod roles;

pub use belt::{BeltRank, belt_color};
pub use identity::IdentityRecord;
pub use membership::{JoinDate, format_membership, months_between};
pub use roles::{Role, RoleSet, STUDENT_ROLE};
