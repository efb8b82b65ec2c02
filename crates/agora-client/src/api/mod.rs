//! Domain queries and mutations
//!
//! Each submodule adds methods to [`CommunityClient`](crate::CommunityClient).
//! Queries return a bound [`Query`](crate::Query); mutations run through the
//! mutation tracker and invalidate the keys their writes affect:
//!
//! | Write | Invalidates |
//! |---|---|
//! | post / vote message | messages, current profile |
//! | approve / remove message | messages |
//! | create / delete event | events |
//! | update event, RSVP | events, event |
//! | save public profile | public profiles, public profile |
//! | profile validation | public profiles, public profile, current profile |
//! | register, onboarding, save profile | current profile |
//! | role and approval changes | admin flag, role, approvals |

mod admin;
mod chat;
mod events;
mod leaderboard;
mod onboarding;
mod profiles;
