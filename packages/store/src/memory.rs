use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::numbering::{self, PersonKind};
use crate::repo::ChurchStore;

#[derive(Clone, Debug)]
struct GroupRecord {
    id: Uuid,
    name: String,
    description: Option<String>,
    member_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    program_owner: Option<ProgramOwner>,
    members: HashMap<Uuid, Member>,
    visitors: HashMap<Uuid, Visitor>,
    donations: HashMap<Uuid, Donation>,
    groups: HashMap<Uuid, GroupRecord>,
    expense_categories: HashMap<Uuid, ExpenseCategory>,
    expenses: HashMap<Uuid, Expense>,
    user_levels: HashMap<Uuid, UserLevel>,
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Session>,
}

/// Display numbers sort by length first so `100000` follows `99999`.
fn number_key(number: &str) -> (usize, &str) {
    (number.len(), number)
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

impl Tables {
    fn group(&self, record: &GroupRecord) -> Group {
        let mut members: Vec<GroupMember> = record
            .member_ids
            .iter()
            .filter_map(|id| self.members.get(id))
            .map(GroupMember::from)
            .collect();
        members.sort_by(|a, b| number_key(&a.member_number).cmp(&number_key(&b.member_number)));
        Group {
            id: record.id,
            name: record.name.clone(),
            description: record.description.clone(),
            members,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn check_members(&self, ids: &[Uuid]) -> StoreResult<()> {
        match ids.iter().find(|id| !self.members.contains_key(id)) {
            Some(id) => Err(StoreError::invalid(format!("member {id} does not exist"))),
            None => Ok(()),
        }
    }

    fn check_donor(&self, donor: Donor) -> StoreResult<()> {
        match donor {
            Donor::Member(id) if !self.members.contains_key(&id) => {
                Err(StoreError::invalid(format!("member {id} does not exist")))
            }
            Donor::Visitor(id) if !self.visitors.contains_key(&id) => {
                Err(StoreError::invalid(format!("visitor {id} does not exist")))
            }
            _ => Ok(()),
        }
    }

    fn check_category(&self, id: Uuid) -> StoreResult<()> {
        if !self.expense_categories.contains_key(&id) {
            return Err(StoreError::invalid(format!("expense category {id} does not exist")));
        }
        Ok(())
    }

    fn check_user_links(&self, member_id: Option<Uuid>, level_id: Option<Uuid>) -> StoreResult<()> {
        if let Some(id) = member_id {
            self.check_members(&[id])?;
        }
        if let Some(id) = level_id {
            if !self.user_levels.contains_key(&id) {
                return Err(StoreError::invalid(format!("user level {id} does not exist")));
            }
        }
        Ok(())
    }

    fn check_username(&self, username: &str, except: Option<Uuid>) -> StoreResult<()> {
        let taken = self
            .users
            .values()
            .any(|u| Some(u.id) != except && same_name(&u.username, username));
        if taken {
            return Err(StoreError::conflict(format!("username {username} is already taken")));
        }
        Ok(())
    }
}

/// Case-insensitive name match, Unicode-aware like SQL `LOWER()`.
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// In-memory ChurchStore for testing and local development.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChurchStore for MemoryStore {
    async fn get_program_owner(&self) -> StoreResult<Option<ProgramOwner>> {
        Ok(self.tables().program_owner.clone())
    }

    async fn create_program_owner(&self, input: ProgramOwnerInput) -> StoreResult<ProgramOwner> {
        input.validate()?;
        let mut tables = self.tables();
        if tables.program_owner.is_some() {
            return Err(StoreError::conflict("a program owner already exists"));
        }
        let now = Utc::now();
        let owner = ProgramOwner {
            id: Uuid::new_v4(),
            church_name: input.church_name,
            pastor_name: input.pastor_name,
            address: input.address,
            phone: input.phone,
            email: input.email,
            website: input.website,
            created_at: now,
            updated_at: now,
        };
        tables.program_owner = Some(owner.clone());
        Ok(owner)
    }

    async fn update_program_owner(
        &self,
        id: Uuid,
        input: ProgramOwnerInput,
    ) -> StoreResult<ProgramOwner> {
        input.validate()?;
        let mut tables = self.tables();
        let owner = tables
            .program_owner
            .as_mut()
            .filter(|o| o.id == id)
            .ok_or(StoreError::NotFound("program owner"))?;
        owner.church_name = input.church_name;
        owner.pastor_name = input.pastor_name;
        owner.address = input.address;
        owner.phone = input.phone;
        owner.email = input.email;
        owner.website = input.website;
        owner.updated_at = Utc::now();
        Ok(owner.clone())
    }

    async fn list_members(&self, search: Option<&str>) -> StoreResult<Vec<Member>> {
        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let tables = self.tables();
        let mut members: Vec<Member> = tables
            .members
            .values()
            .filter(|m| needle.as_deref().map_or(true, |n| m.matches(n)))
            .cloned()
            .collect();
        members.sort_by(|a, b| number_key(&a.member_number).cmp(&number_key(&b.member_number)));
        Ok(members)
    }

    async fn get_member(&self, id: Uuid) -> StoreResult<Member> {
        self.tables()
            .members
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("member"))
    }

    async fn create_member(&self, input: MemberInput) -> StoreResult<Member> {
        input.validate()?;
        let mut tables = self.tables();
        let member_number = numbering::next_number(
            PersonKind::Member,
            tables.members.values().map(|m| m.member_number.as_str()),
        );
        let now = Utc::now();
        let member = Member {
            id: Uuid::new_v4(),
            member_number,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            phone: input.phone,
            address: input.address,
            date_of_birth: input.date_of_birth,
            gender: input.gender,
            marital_status: input.marital_status,
            join_date: input.join_date,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        tables.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn update_member(&self, id: Uuid, input: MemberInput) -> StoreResult<Member> {
        input.validate()?;
        let mut tables = self.tables();
        let member = tables
            .members
            .get_mut(&id)
            .ok_or(StoreError::NotFound("member"))?;
        member.first_name = input.first_name;
        member.last_name = input.last_name;
        member.email = input.email;
        member.phone = input.phone;
        member.address = input.address;
        member.date_of_birth = input.date_of_birth;
        member.gender = input.gender;
        member.marital_status = input.marital_status;
        member.join_date = input.join_date;
        member.notes = input.notes;
        member.updated_at = Utc::now();
        Ok(member.clone())
    }

    async fn delete_member(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables();
        if !tables.members.contains_key(&id) {
            return Err(StoreError::NotFound("member"));
        }
        if tables.donations.values().any(|d| d.member_id == Some(id)) {
            return Err(StoreError::conflict("member still has donations"));
        }
        tables.members.remove(&id);
        for group in tables.groups.values_mut() {
            group.member_ids.retain(|m| *m != id);
        }
        for user in tables.users.values_mut() {
            if user.member_id == Some(id) {
                user.member_id = None;
            }
        }
        Ok(())
    }

    async fn list_visitors(&self, search: Option<&str>) -> StoreResult<Vec<Visitor>> {
        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let tables = self.tables();
        let mut visitors: Vec<Visitor> = tables
            .visitors
            .values()
            .filter(|v| needle.as_deref().map_or(true, |n| v.matches(n)))
            .cloned()
            .collect();
        visitors.sort_by(|a, b| number_key(&a.visitor_number).cmp(&number_key(&b.visitor_number)));
        Ok(visitors)
    }

    async fn get_visitor(&self, id: Uuid) -> StoreResult<Visitor> {
        self.tables()
            .visitors
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("visitor"))
    }

    async fn create_visitor(&self, input: VisitorInput) -> StoreResult<Visitor> {
        input.validate()?;
        let mut tables = self.tables();
        let visitor_number = numbering::next_number(
            PersonKind::Visitor,
            tables.visitors.values().map(|v| v.visitor_number.as_str()),
        );
        let now = Utc::now();
        let visitor = Visitor {
            id: Uuid::new_v4(),
            visitor_number,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            phone: input.phone,
            address: input.address,
            visit_date: input.visit_date,
            invited_by: input.invited_by,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        tables.visitors.insert(visitor.id, visitor.clone());
        Ok(visitor)
    }

    async fn update_visitor(&self, id: Uuid, input: VisitorInput) -> StoreResult<Visitor> {
        input.validate()?;
        let mut tables = self.tables();
        let visitor = tables
            .visitors
            .get_mut(&id)
            .ok_or(StoreError::NotFound("visitor"))?;
        visitor.first_name = input.first_name;
        visitor.last_name = input.last_name;
        visitor.email = input.email;
        visitor.phone = input.phone;
        visitor.address = input.address;
        visitor.visit_date = input.visit_date;
        visitor.invited_by = input.invited_by;
        visitor.notes = input.notes;
        visitor.updated_at = Utc::now();
        Ok(visitor.clone())
    }

    async fn delete_visitor(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables();
        if !tables.visitors.contains_key(&id) {
            return Err(StoreError::NotFound("visitor"));
        }
        if tables.donations.values().any(|d| d.visitor_id == Some(id)) {
            return Err(StoreError::conflict("visitor still has donations"));
        }
        tables.visitors.remove(&id);
        Ok(())
    }

    async fn renumber(&self, kind: PersonKind) -> StoreResult<usize> {
        let mut tables = self.tables();
        match kind {
            PersonKind::Member => {
                let mut order: Vec<(DateTime<Utc>, String, Uuid)> = tables
                    .members
                    .values()
                    .map(|m| (m.created_at, m.member_number.clone(), m.id))
                    .collect();
                order.sort_by(|a, b| {
                    a.0.cmp(&b.0)
                        .then_with(|| number_key(&a.1).cmp(&number_key(&b.1)))
                });
                let count = order.len();
                let numbers = numbering::sequence(kind, count);
                for ((_, _, id), number) in order.into_iter().zip(numbers) {
                    if let Some(member) = tables.members.get_mut(&id) {
                        member.member_number = number;
                    }
                }
                Ok(count)
            }
            PersonKind::Visitor => {
                let mut order: Vec<(DateTime<Utc>, String, Uuid)> = tables
                    .visitors
                    .values()
                    .map(|v| (v.created_at, v.visitor_number.clone(), v.id))
                    .collect();
                order.sort_by(|a, b| {
                    a.0.cmp(&b.0)
                        .then_with(|| number_key(&a.1).cmp(&number_key(&b.1)))
                });
                let count = order.len();
                let numbers = numbering::sequence(kind, count);
                for ((_, _, id), number) in order.into_iter().zip(numbers) {
                    if let Some(visitor) = tables.visitors.get_mut(&id) {
                        visitor.visitor_number = number;
                    }
                }
                Ok(count)
            }
        }
    }

    async fn list_donations(&self, filter: &DonationFilter) -> StoreResult<Vec<Donation>> {
        let tables = self.tables();
        let mut donations: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        donations.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(donations)
    }

    async fn get_donation(&self, id: Uuid) -> StoreResult<Donation> {
        self.tables()
            .donations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("donation"))
    }

    async fn create_donation(&self, input: DonationInput) -> StoreResult<Donation> {
        let donor = input.validate()?;
        let mut tables = self.tables();
        tables.check_donor(donor)?;
        let now = Utc::now();
        let donation = Donation {
            id: Uuid::new_v4(),
            amount: input.amount,
            donation_type: input.donation_type,
            date: input.date,
            notes: input.notes,
            member_id: input.member_id,
            visitor_id: input.visitor_id,
            created_at: now,
            updated_at: now,
        };
        tables.donations.insert(donation.id, donation.clone());
        Ok(donation)
    }

    async fn update_donation(&self, id: Uuid, input: DonationInput) -> StoreResult<Donation> {
        let donor = input.validate()?;
        let mut tables = self.tables();
        if !tables.donations.contains_key(&id) {
            return Err(StoreError::NotFound("donation"));
        }
        tables.check_donor(donor)?;
        let donation = tables
            .donations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("donation"))?;
        donation.amount = input.amount;
        donation.donation_type = input.donation_type;
        donation.date = input.date;
        donation.notes = input.notes;
        donation.member_id = input.member_id;
        donation.visitor_id = input.visitor_id;
        donation.updated_at = Utc::now();
        Ok(donation.clone())
    }

    async fn delete_donation(&self, id: Uuid) -> StoreResult<()> {
        self.tables()
            .donations
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("donation"))
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let tables = self.tables();
        let mut groups: Vec<Group> = tables.groups.values().map(|g| tables.group(g)).collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn get_group(&self, id: Uuid) -> StoreResult<Group> {
        let tables = self.tables();
        let record = tables.groups.get(&id).ok_or(StoreError::NotFound("group"))?;
        Ok(tables.group(record))
    }

    async fn create_group(&self, input: GroupInput) -> StoreResult<Group> {
        input.validate()?;
        let mut tables = self.tables();
        tables.check_members(&input.member_ids)?;
        let now = Utc::now();
        let record = GroupRecord {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            member_ids: dedup(&input.member_ids),
            created_at: now,
            updated_at: now,
        };
        let group = tables.group(&record);
        tables.groups.insert(record.id, record);
        Ok(group)
    }

    async fn update_group(&self, id: Uuid, input: GroupInput) -> StoreResult<Group> {
        input.validate()?;
        let mut tables = self.tables();
        if !tables.groups.contains_key(&id) {
            return Err(StoreError::NotFound("group"));
        }
        tables.check_members(&input.member_ids)?;
        let record = tables.groups.get_mut(&id).ok_or(StoreError::NotFound("group"))?;
        record.name = input.name;
        record.description = input.description;
        record.member_ids = dedup(&input.member_ids);
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(tables.group(&record))
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<()> {
        self.tables()
            .groups
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("group"))
    }

    async fn add_group_member(&self, group_id: Uuid, member_id: Uuid) -> StoreResult<Group> {
        let mut tables = self.tables();
        if !tables.groups.contains_key(&group_id) {
            return Err(StoreError::NotFound("group"));
        }
        tables.check_members(&[member_id])?;
        let record = tables
            .groups
            .get_mut(&group_id)
            .ok_or(StoreError::NotFound("group"))?;
        if !record.member_ids.contains(&member_id) {
            record.member_ids.push(member_id);
            record.updated_at = Utc::now();
        }
        let record = record.clone();
        Ok(tables.group(&record))
    }

    async fn remove_group_member(&self, group_id: Uuid, member_id: Uuid) -> StoreResult<Group> {
        let mut tables = self.tables();
        let record = tables
            .groups
            .get_mut(&group_id)
            .ok_or(StoreError::NotFound("group"))?;
        let before = record.member_ids.len();
        record.member_ids.retain(|m| *m != member_id);
        if record.member_ids.len() == before {
            return Err(StoreError::NotFound("group member"));
        }
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(tables.group(&record))
    }

    async fn list_expense_categories(&self) -> StoreResult<Vec<ExpenseCategory>> {
        let mut categories: Vec<ExpenseCategory> =
            self.tables().expense_categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_expense_category(&self, id: Uuid) -> StoreResult<ExpenseCategory> {
        self.tables()
            .expense_categories
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("expense category"))
    }

    async fn create_expense_category(
        &self,
        input: ExpenseCategoryInput,
    ) -> StoreResult<ExpenseCategory> {
        input.validate()?;
        let now = Utc::now();
        let category = ExpenseCategory {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.tables()
            .expense_categories
            .insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_expense_category(
        &self,
        id: Uuid,
        input: ExpenseCategoryInput,
    ) -> StoreResult<ExpenseCategory> {
        input.validate()?;
        let mut tables = self.tables();
        let category = tables
            .expense_categories
            .get_mut(&id)
            .ok_or(StoreError::NotFound("expense category"))?;
        category.name = input.name;
        category.description = input.description;
        category.updated_at = Utc::now();
        Ok(category.clone())
    }

    async fn delete_expense_category(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables();
        if !tables.expense_categories.contains_key(&id) {
            return Err(StoreError::NotFound("expense category"));
        }
        if tables.expenses.values().any(|e| e.category_id == id) {
            return Err(StoreError::conflict("expense category still has expenses"));
        }
        tables.expense_categories.remove(&id);
        Ok(())
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> StoreResult<Vec<Expense>> {
        let tables = self.tables();
        let mut expenses: Vec<Expense> = tables
            .expenses
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        expenses.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(expenses)
    }

    async fn get_expense(&self, id: Uuid) -> StoreResult<Expense> {
        self.tables()
            .expenses
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("expense"))
    }

    async fn create_expense(&self, input: ExpenseInput) -> StoreResult<Expense> {
        input.validate()?;
        let mut tables = self.tables();
        tables.check_category(input.category_id)?;
        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4(),
            category_id: input.category_id,
            amount: input.amount,
            date: input.date,
            description: input.description,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        tables.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn update_expense(&self, id: Uuid, input: ExpenseInput) -> StoreResult<Expense> {
        input.validate()?;
        let mut tables = self.tables();
        if !tables.expenses.contains_key(&id) {
            return Err(StoreError::NotFound("expense"));
        }
        tables.check_category(input.category_id)?;
        let expense = tables
            .expenses
            .get_mut(&id)
            .ok_or(StoreError::NotFound("expense"))?;
        expense.category_id = input.category_id;
        expense.amount = input.amount;
        expense.date = input.date;
        expense.description = input.description;
        expense.notes = input.notes;
        expense.updated_at = Utc::now();
        Ok(expense.clone())
    }

    async fn delete_expense(&self, id: Uuid) -> StoreResult<()> {
        self.tables()
            .expenses
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("expense"))
    }

    async fn list_user_levels(&self) -> StoreResult<Vec<UserLevel>> {
        let mut levels: Vec<UserLevel> = self.tables().user_levels.values().cloned().collect();
        levels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(levels)
    }

    async fn get_user_level(&self, id: Uuid) -> StoreResult<UserLevel> {
        self.tables()
            .user_levels
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user level"))
    }

    async fn create_user_level(&self, input: UserLevelInput) -> StoreResult<UserLevel> {
        input.validate()?;
        let mut tables = self.tables();
        if tables
            .user_levels
            .values()
            .any(|l| same_name(&l.name, &input.name))
        {
            return Err(StoreError::conflict(format!(
                "user level {} already exists",
                input.name
            )));
        }
        let now = Utc::now();
        let level = UserLevel {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            permissions: input.permissions,
            created_at: now,
            updated_at: now,
        };
        tables.user_levels.insert(level.id, level.clone());
        Ok(level)
    }

    async fn update_user_level(&self, id: Uuid, input: UserLevelInput) -> StoreResult<UserLevel> {
        input.validate()?;
        let mut tables = self.tables();
        if tables
            .user_levels
            .values()
            .any(|l| l.id != id && same_name(&l.name, &input.name))
        {
            return Err(StoreError::conflict(format!(
                "user level {} already exists",
                input.name
            )));
        }
        let level = tables
            .user_levels
            .get_mut(&id)
            .ok_or(StoreError::NotFound("user level"))?;
        level.name = input.name;
        level.description = input.description;
        level.permissions = input.permissions;
        level.updated_at = Utc::now();
        Ok(level.clone())
    }

    async fn delete_user_level(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables();
        if tables.user_levels.remove(&id).is_none() {
            return Err(StoreError::NotFound("user level"));
        }
        for user in tables.users.values_mut() {
            if user.level_id == Some(id) {
                user.level_id = None;
            }
        }
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.tables().users.len() as u64)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.tables().users.values().cloned().collect();
        users.sort_by_key(|u| u.username.to_lowercase());
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        self.tables()
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| same_name(&u.username, username))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        user.validate()?;
        let mut tables = self.tables();
        tables.check_username(&user.username, None)?;
        tables.check_user_links(user.member_id, user.level_id)?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            full_name: user.full_name,
            email: user.email,
            member_id: user.member_id,
            level_id: user.level_id,
            is_active: user.is_active,
            permissions: user.permissions,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> StoreResult<User> {
        update.validate()?;
        let mut tables = self.tables();
        if !tables.users.contains_key(&id) {
            return Err(StoreError::NotFound("user"));
        }
        tables.check_username(&update.username, Some(id))?;
        tables.check_user_links(update.member_id, update.level_id)?;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        user.username = update.username;
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        user.full_name = update.full_name;
        user.email = update.email;
        user.member_id = update.member_id;
        user.level_id = update.level_id;
        user.is_active = update.is_active;
        user.permissions = update.permissions;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables();
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::NotFound("user"));
        }
        tables.sessions.retain(|_, s| s.user_id != id);
        Ok(())
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        self.tables().sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(self.tables().sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        self.tables().sessions.remove(token);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<()> {
        self.tables().sessions.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}
