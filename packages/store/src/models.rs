//! # Domain models
//!
//! Every record the church office keeps, plus the input structs the API accepts
//! for creating and replacing them. All types are `Serialize + Deserialize` with
//! camelCase field names so they go over the wire unchanged.
//!
//! | Record | Input | Notes |
//! |--------|-------|-------|
//! | [`ProgramOwner`] | [`ProgramOwnerInput`] | singleton church/contact record |
//! | [`Member`] | [`MemberInput`] | numbered `00101`, `00102`, ... |
//! | [`Visitor`] | [`VisitorInput`] | numbered `V00101`, ... |
//! | [`Donation`] | [`DonationInput`] | belongs to exactly one member or visitor |
//! | [`Group`] | [`GroupInput`] | many-to-many with members |
//! | [`ExpenseCategory`] | [`ExpenseCategoryInput`] | |
//! | [`Expense`] | [`ExpenseInput`] | belongs to a category |
//! | [`UserLevel`] | [`UserLevelInput`] | named permission preset |
//! | [`User`] | [`NewUser`] / [`UserUpdate`] | login account with permission flags |
//!
//! Inputs carry a `validate` method; both store implementations call it before
//! writing so validation rules live in one place.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::permissions::PermissionFlags;

fn required(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::invalid(format!("{field} is required")));
    }
    Ok(())
}

/// Largest money amount a `NUMERIC(12, 2)` column holds, exclusive.
const AMOUNT_LIMIT: i64 = 10_000_000_000;

fn money(field: &str, value: Decimal) -> StoreResult<()> {
    if value <= Decimal::ZERO {
        return Err(StoreError::invalid(format!("{field} must be greater than zero")));
    }
    if value.normalize().scale() > 2 {
        return Err(StoreError::invalid(format!(
            "{field} must have at most two decimal places"
        )));
    }
    if value >= Decimal::from(AMOUNT_LIMIT) {
        return Err(StoreError::invalid(format!(
            "{field} must be less than {AMOUNT_LIMIT}"
        )));
    }
    Ok(())
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

/// The church running this installation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct ProgramOwner {
    pub id: Uuid,
    pub church_name: String,
    pub pastor_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramOwnerInput {
    pub church_name: String,
    #[serde(default)]
    pub pastor_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

impl ProgramOwnerInput {
    pub fn validate(&self) -> StoreResult<()> {
        required("churchName", &self.church_name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub member_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub marital_status: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// Case-insensitive match on name, number or email. `needle` must be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.first_name.to_lowercase().contains(needle)
            || self.last_name.to_lowercase().contains(needle)
            || self.member_number.to_lowercase().contains(needle)
            || contains_ci(self.email.as_deref(), needle)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub join_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MemberInput {
    pub fn validate(&self) -> StoreResult<()> {
        required("firstName", &self.first_name)?;
        required("lastName", &self.last_name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub id: Uuid,
    pub visitor_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub visit_date: Option<NaiveDate>,
    pub invited_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visitor {
    /// Case-insensitive match on name, number or email. `needle` must be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.first_name.to_lowercase().contains(needle)
            || self.last_name.to_lowercase().contains(needle)
            || self.visitor_number.to_lowercase().contains(needle)
            || contains_ci(self.email.as_deref(), needle)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub visit_date: Option<NaiveDate>,
    #[serde(default)]
    pub invited_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl VisitorInput {
    pub fn validate(&self) -> StoreResult<()> {
        required("firstName", &self.first_name)?;
        required("lastName", &self.last_name)
    }
}

/// Who gave a donation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Donor {
    Member(Uuid),
    Visitor(Uuid),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: Uuid,
    pub amount: Decimal,
    pub donation_type: String,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub member_id: Option<Uuid>,
    pub visitor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationInput {
    pub amount: Decimal,
    pub donation_type: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub member_id: Option<Uuid>,
    #[serde(default)]
    pub visitor_id: Option<Uuid>,
}

impl DonationInput {
    /// Validate and resolve the single donor.
    pub fn validate(&self) -> StoreResult<Donor> {
        money("amount", self.amount)?;
        required("donationType", &self.donation_type)?;
        match (self.member_id, self.visitor_id) {
            (Some(id), None) => Ok(Donor::Member(id)),
            (None, Some(id)) => Ok(Donor::Visitor(id)),
            (Some(_), Some(_)) => Err(StoreError::invalid(
                "a donation belongs to either a member or a visitor, not both",
            )),
            (None, None) => Err(StoreError::invalid(
                "a donation needs a memberId or a visitorId",
            )),
        }
    }
}

/// Query filter for listing donations. All bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DonationFilter {
    pub member_id: Option<Uuid>,
    pub visitor_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DonationFilter {
    pub fn matches(&self, donation: &Donation) -> bool {
        self.member_id.map_or(true, |id| donation.member_id == Some(id))
            && self.visitor_id.map_or(true, |id| donation.visitor_id == Some(id))
            && self.from.map_or(true, |from| donation.date >= from)
            && self.to.map_or(true, |to| donation.date <= to)
    }
}

/// Donation totals over a period, broken down by type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationReport {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub total: Decimal,
    pub count: usize,
    pub by_type: Vec<DonationTypeTotal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationTypeTotal {
    pub donation_type: String,
    pub total: Decimal,
    pub count: usize,
}

impl DonationReport {
    pub fn summarize<'a>(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        donations: impl IntoIterator<Item = &'a Donation>,
    ) -> Self {
        let mut by_type: std::collections::BTreeMap<&str, (Decimal, usize)> = Default::default();
        let mut total = Decimal::ZERO;
        let mut count = 0;
        for donation in donations {
            total += donation.amount;
            count += 1;
            let entry = by_type
                .entry(donation.donation_type.as_str())
                .or_insert((Decimal::ZERO, 0));
            entry.0 += donation.amount;
            entry.1 += 1;
        }
        DonationReport {
            from,
            to,
            total,
            count,
            by_type: by_type
                .into_iter()
                .map(|(donation_type, (total, count))| DonationTypeTotal {
                    donation_type: donation_type.to_string(),
                    total,
                    count,
                })
                .collect(),
        }
    }
}

/// Compact member reference embedded in a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: Uuid,
    pub member_number: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&Member> for GroupMember {
    fn from(member: &Member) -> Self {
        GroupMember {
            id: member.id,
            member_number: member.member_number.clone(),
            first_name: member.first_name.clone(),
            last_name: member.last_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Sorted by member number.
    #[cfg_attr(feature = "postgres", sqlx(skip))]
    pub members: Vec<GroupMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn member_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|m| m.id).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

impl GroupInput {
    pub fn validate(&self) -> StoreResult<()> {
        required("name", &self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ExpenseCategoryInput {
    pub fn validate(&self) -> StoreResult<()> {
        required("name", &self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub category_id: Uuid,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    pub category_id: Uuid,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExpenseInput {
    pub fn validate(&self) -> StoreResult<()> {
        money("amount", self.amount)?;
        required("description", &self.description)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpenseFilter {
    pub category_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        self.category_id.map_or(true, |id| expense.category_id == id)
            && self.from.map_or(true, |from| expense.date >= from)
            && self.to.map_or(true, |to| expense.date <= to)
    }
}

/// A named permission preset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct UserLevel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[cfg_attr(feature = "postgres", sqlx(json))]
    pub permissions: PermissionFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLevelInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: PermissionFlags,
}

impl UserLevelInput {
    pub fn validate(&self) -> StoreResult<()> {
        required("name", &self.name)
    }
}

/// A login account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Argon2 PHC string; never leaves the server.
    #[serde(skip)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub member_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    pub is_active: bool,
    #[cfg_attr(feature = "postgres", sqlx(json))]
    pub permissions: PermissionFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Get display name, falling back to the username.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// A user about to be created. The password is already hashed.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub member_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    pub is_active: bool,
    pub permissions: PermissionFlags,
}

impl NewUser {
    pub fn validate(&self) -> StoreResult<()> {
        required("username", &self.username)
    }
}

/// Replacement values for an existing user. `password_hash: None` keeps the
/// current password.
#[derive(Clone, Debug, PartialEq)]
pub struct UserUpdate {
    pub username: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub member_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    pub is_active: bool,
    pub permissions: PermissionFlags,
}

impl UserUpdate {
    pub fn validate(&self) -> StoreResult<()> {
        required("username", &self.username)
    }
}

/// A bearer token issued at login.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
