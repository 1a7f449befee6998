// src/repository/mod.rs
pub mod in_memory_membership_repository;
pub mod membership_repository;
pub mod membership_state_provider;

pub use in_memory_membership_repository::InMemoryMembershipRepository;
pub use membership_repository::MembershipRepository;
pub use membership_state_provider::MembershipStateProvider;
