//! # ChurchStore: the storage seam
//!
//! Route handlers never talk to a database directly; they go through the
//! [`ChurchStore`] trait. Two implementations exist: [`crate::MemoryStore`]
//! (in-process, used by tests and the server's `--memory` mode) and the
//! PostgreSQL store in the `api` crate.
//!
//! ## Contract
//!
//! Every implementation must behave the same way:
//!
//! - Inputs are validated with their `validate` method before any write;
//!   failures are [`StoreError::Invalid`].
//! - Unknown ids are [`StoreError::NotFound`].
//! - Member and visitor numbers are assigned on create with
//!   [`crate::numbering::next_number`] and are unique.
//! - A second program owner, a duplicate username, deleting a person who still
//!   has donations, and deleting a category that still has expenses are
//!   [`StoreError::Conflict`].
//! - A donation must reference an existing member or visitor, an expense an
//!   existing category, a group only existing members, a user an existing
//!   member and level; otherwise [`StoreError::Invalid`].
//! - Deleting a member removes it from every group and unlinks it from users.
//!   Deleting a level unlinks it from users. Deleting a user drops its sessions.
//! - Lists are ordered: members and visitors by number, donations and expenses
//!   by date (newest first), groups, categories and levels by name, users by
//!   username.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::*;
use crate::numbering::PersonKind;

#[async_trait]
pub trait ChurchStore: Send + Sync {
    // Program owner
    async fn get_program_owner(&self) -> StoreResult<Option<ProgramOwner>>;
    async fn create_program_owner(&self, input: ProgramOwnerInput) -> StoreResult<ProgramOwner>;
    async fn update_program_owner(
        &self,
        id: Uuid,
        input: ProgramOwnerInput,
    ) -> StoreResult<ProgramOwner>;

    // Members
    async fn list_members(&self, search: Option<&str>) -> StoreResult<Vec<Member>>;
    async fn get_member(&self, id: Uuid) -> StoreResult<Member>;
    async fn create_member(&self, input: MemberInput) -> StoreResult<Member>;
    async fn update_member(&self, id: Uuid, input: MemberInput) -> StoreResult<Member>;
    async fn delete_member(&self, id: Uuid) -> StoreResult<()>;

    // Visitors
    async fn list_visitors(&self, search: Option<&str>) -> StoreResult<Vec<Visitor>>;
    async fn get_visitor(&self, id: Uuid) -> StoreResult<Visitor>;
    async fn create_visitor(&self, input: VisitorInput) -> StoreResult<Visitor>;
    async fn update_visitor(&self, id: Uuid, input: VisitorInput) -> StoreResult<Visitor>;
    async fn delete_visitor(&self, id: Uuid) -> StoreResult<()>;

    /// Reassign display numbers sequentially in creation order. Returns the
    /// number of records renumbered.
    async fn renumber(&self, kind: PersonKind) -> StoreResult<usize>;

    // Donations
    async fn list_donations(&self, filter: &DonationFilter) -> StoreResult<Vec<Donation>>;
    async fn get_donation(&self, id: Uuid) -> StoreResult<Donation>;
    async fn create_donation(&self, input: DonationInput) -> StoreResult<Donation>;
    async fn update_donation(&self, id: Uuid, input: DonationInput) -> StoreResult<Donation>;
    async fn delete_donation(&self, id: Uuid) -> StoreResult<()>;

    // Groups
    async fn list_groups(&self) -> StoreResult<Vec<Group>>;
    async fn get_group(&self, id: Uuid) -> StoreResult<Group>;
    async fn create_group(&self, input: GroupInput) -> StoreResult<Group>;
    /// Replaces name, description and the whole member set.
    async fn update_group(&self, id: Uuid, input: GroupInput) -> StoreResult<Group>;
    async fn delete_group(&self, id: Uuid) -> StoreResult<()>;
    /// Adding a member that is already in the group is a no-op.
    async fn add_group_member(&self, group_id: Uuid, member_id: Uuid) -> StoreResult<Group>;
    async fn remove_group_member(&self, group_id: Uuid, member_id: Uuid) -> StoreResult<Group>;

    // Expense categories
    async fn list_expense_categories(&self) -> StoreResult<Vec<ExpenseCategory>>;
    async fn get_expense_category(&self, id: Uuid) -> StoreResult<ExpenseCategory>;
    async fn create_expense_category(
        &self,
        input: ExpenseCategoryInput,
    ) -> StoreResult<ExpenseCategory>;
    async fn update_expense_category(
        &self,
        id: Uuid,
        input: ExpenseCategoryInput,
    ) -> StoreResult<ExpenseCategory>;
    async fn delete_expense_category(&self, id: Uuid) -> StoreResult<()>;

    // Expenses
    async fn list_expenses(&self, filter: &ExpenseFilter) -> StoreResult<Vec<Expense>>;
    async fn get_expense(&self, id: Uuid) -> StoreResult<Expense>;
    async fn create_expense(&self, input: ExpenseInput) -> StoreResult<Expense>;
    async fn update_expense(&self, id: Uuid, input: ExpenseInput) -> StoreResult<Expense>;
    async fn delete_expense(&self, id: Uuid) -> StoreResult<()>;

    // User levels
    async fn list_user_levels(&self) -> StoreResult<Vec<UserLevel>>;
    async fn get_user_level(&self, id: Uuid) -> StoreResult<UserLevel>;
    async fn create_user_level(&self, input: UserLevelInput) -> StoreResult<UserLevel>;
    async fn update_user_level(&self, id: Uuid, input: UserLevelInput) -> StoreResult<UserLevel>;
    async fn delete_user_level(&self, id: Uuid) -> StoreResult<()>;

    // Users
    async fn count_users(&self) -> StoreResult<u64>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn get_user(&self, id: Uuid) -> StoreResult<User>;
    /// Case-insensitive lookup.
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: Uuid, update: UserUpdate) -> StoreResult<User>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;

    // Sessions
    async fn create_session(&self, session: Session) -> StoreResult<()>;
    async fn find_session(&self, token: &str) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, token: &str) -> StoreResult<()>;
    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<()>;
    /// Drop every session expired at `now`; returns how many were removed.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
