//! # PgStore: `ChurchStore` over PostgreSQL
//!
//! Plain runtime queries (`sqlx::query_as`) mapped onto the store models, which
//! derive `FromRow` through the store crate's `postgres` feature. Writes that
//! must read before they write (number assignment, renumbering, group member
//! sets) run in a transaction; number assignment additionally takes a
//! transaction-scoped advisory lock so concurrent creates cannot pick the same
//! number.
//!
//! Database errors are classified by SQLSTATE in [`db_error`]: unique
//! violations become conflicts, foreign-key and check violations become
//! invalid input, everything else is a backend error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use store::models::*;
use store::numbering::{self, PersonKind};
use store::{ChurchStore, StoreError, StoreResult};
use uuid::Uuid;

const MEMBER_NUMBER_LOCK: i64 = 0x666c_6f63_6b01;
const VISITOR_NUMBER_LOCK: i64 = 0x666c_6f63_6b02;

const GROUP_MEMBERS_QUERY: &str = r#"
    SELECT gm.group_id, m.id, m.member_number, m.first_name, m.last_name
    FROM group_members gm
    JOIN members m ON m.id = gm.member_id
"#;

fn db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => {
                let msg = match db.constraint() {
                    Some("program_owner_singleton_key") => "a program owner already exists",
                    Some("users_username_key") => "username is already taken",
                    Some("user_levels_name_key") => "a user level with this name already exists",
                    Some("members_member_number_key") | Some("visitors_visitor_number_key") => {
                        "display number is already in use"
                    }
                    _ => "record already exists",
                };
                return StoreError::conflict(msg);
            }
            Some("23503") => return StoreError::invalid("referenced record does not exist"),
            Some("23514") => {
                return StoreError::invalid(format!("constraint violated: {}", db.message()))
            }
            Some("22003") => return StoreError::invalid("numeric value out of range"),
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

/// `%needle%` for ILIKE, with the pattern characters escaped.
fn like_pattern(search: Option<&str>) -> Option<String> {
    let needle = search.map(str::trim).filter(|s| !s.is_empty())?;
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
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

/// PostgreSQL-backed store.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(db_error)
    }

    async fn lock_numbers(
        tx: &mut Transaction<'static, Postgres>,
        kind: PersonKind,
    ) -> StoreResult<()> {
        let key = match kind {
            PersonKind::Member => MEMBER_NUMBER_LOCK,
            PersonKind::Visitor => VISITOR_NUMBER_LOCK,
        };
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn next_number(
        tx: &mut Transaction<'static, Postgres>,
        kind: PersonKind,
    ) -> StoreResult<String> {
        Self::lock_numbers(tx, kind).await?;
        let query = match kind {
            PersonKind::Member => "SELECT member_number FROM members",
            PersonKind::Visitor => "SELECT visitor_number FROM visitors",
        };
        let existing: Vec<String> = sqlx::query_scalar(query)
            .fetch_all(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(numbering::next_number(kind, existing.iter().map(String::as_str)))
    }

    /// Attach members to each group, sorted by member number.
    async fn load_group_members(&self, groups: &mut [Group]) -> StoreResult<()> {
        if groups.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = groups.iter().map(|g| g.id).collect();
        let query = format!(
            "{GROUP_MEMBERS_QUERY} WHERE gm.group_id = ANY($1) \
             ORDER BY LENGTH(m.member_number), m.member_number"
        );
        let rows: Vec<(Uuid, Uuid, String, String, String)> = sqlx::query_as(&query)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        for (group_id, id, member_number, first_name, last_name) in rows {
            if let Some(group) = groups.iter_mut().find(|g| g.id == group_id) {
                group.members.push(GroupMember {
                    id,
                    member_number,
                    first_name,
                    last_name,
                });
            }
        }
        Ok(())
    }

    async fn group_exists(&self, id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM church_groups WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn replace_group_members(
        tx: &mut Transaction<'static, Postgres>,
        group_id: Uuid,
        member_ids: &[Uuid],
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM group_members WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        let member_ids = dedup(member_ids);
        if member_ids.is_empty() {
            return Ok(());
        }
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE id = ANY($1)")
            .bind(&member_ids)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error)?;
        if existing as usize != member_ids.len() {
            return Err(StoreError::invalid("one or more members do not exist"));
        }
        sqlx::query(
            "INSERT INTO group_members (group_id, member_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(group_id)
        .bind(&member_ids)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn check_donor(&self, donor: Donor) -> StoreResult<()> {
        let (query, id, label) = match donor {
            Donor::Member(id) => (
                "SELECT EXISTS (SELECT 1 FROM members WHERE id = $1)",
                id,
                "member",
            ),
            Donor::Visitor(id) => (
                "SELECT EXISTS (SELECT 1 FROM visitors WHERE id = $1)",
                id,
                "visitor",
            ),
        };
        let exists: bool = sqlx::query_scalar(query)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        if !exists {
            return Err(StoreError::invalid(format!("{label} {id} does not exist")));
        }
        Ok(())
    }

    async fn count_references(&self, query: &str, id: Uuid) -> StoreResult<i64> {
        sqlx::query_scalar(query)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl ChurchStore for PgStore {
    async fn get_program_owner(&self) -> StoreResult<Option<ProgramOwner>> {
        sqlx::query_as("SELECT * FROM program_owner LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn create_program_owner(&self, input: ProgramOwnerInput) -> StoreResult<ProgramOwner> {
        input.validate()?;
        if self.get_program_owner().await?.is_some() {
            return Err(StoreError::conflict("a program owner already exists"));
        }
        sqlx::query_as(
            r#"
            INSERT INTO program_owner (id, church_name, pastor_name, address, phone, email, website)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.church_name)
        .bind(&input.pastor_name)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.website)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn update_program_owner(
        &self,
        id: Uuid,
        input: ProgramOwnerInput,
    ) -> StoreResult<ProgramOwner> {
        input.validate()?;
        sqlx::query_as(
            r#"
            UPDATE program_owner SET
                church_name = $2, pastor_name = $3, address = $4,
                phone = $5, email = $6, website = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.church_name)
        .bind(&input.pastor_name)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.website)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("program owner"))
    }

    async fn list_members(&self, search: Option<&str>) -> StoreResult<Vec<Member>> {
        sqlx::query_as(
            r#"
            SELECT * FROM members
            WHERE $1::text IS NULL
               OR first_name ILIKE $1 OR last_name ILIKE $1
               OR member_number ILIKE $1 OR email ILIKE $1
            ORDER BY LENGTH(member_number), member_number
            "#,
        )
        .bind(like_pattern(search))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn get_member(&self, id: Uuid) -> StoreResult<Member> {
        sqlx::query_as("SELECT * FROM members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("member"))
    }

    async fn create_member(&self, input: MemberInput) -> StoreResult<Member> {
        input.validate()?;
        let mut tx = self.begin().await?;
        let member_number = Self::next_number(&mut tx, PersonKind::Member).await?;
        let member: Member = sqlx::query_as(
            r#"
            INSERT INTO members (id, member_number, first_name, last_name, email, phone, address,
                                 date_of_birth, gender, marital_status, join_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&member_number)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.date_of_birth)
        .bind(&input.gender)
        .bind(&input.marital_status)
        .bind(input.join_date)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(member)
    }

    async fn update_member(&self, id: Uuid, input: MemberInput) -> StoreResult<Member> {
        input.validate()?;
        sqlx::query_as(
            r#"
            UPDATE members SET
                first_name = $2, last_name = $3, email = $4, phone = $5, address = $6,
                date_of_birth = $7, gender = $8, marital_status = $9, join_date = $10,
                notes = $11, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.date_of_birth)
        .bind(&input.gender)
        .bind(&input.marital_status)
        .bind(input.join_date)
        .bind(&input.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("member"))
    }

    async fn delete_member(&self, id: Uuid) -> StoreResult<()> {
        self.get_member(id).await?;
        let donations = self
            .count_references("SELECT COUNT(*) FROM donations WHERE member_id = $1", id)
            .await?;
        if donations > 0 {
            return Err(StoreError::conflict("member still has donations"));
        }
        sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn list_visitors(&self, search: Option<&str>) -> StoreResult<Vec<Visitor>> {
        sqlx::query_as(
            r#"
            SELECT * FROM visitors
            WHERE $1::text IS NULL
               OR first_name ILIKE $1 OR last_name ILIKE $1
               OR visitor_number ILIKE $1 OR email ILIKE $1
            ORDER BY LENGTH(visitor_number), visitor_number
            "#,
        )
        .bind(like_pattern(search))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn get_visitor(&self, id: Uuid) -> StoreResult<Visitor> {
        sqlx::query_as("SELECT * FROM visitors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("visitor"))
    }

    async fn create_visitor(&self, input: VisitorInput) -> StoreResult<Visitor> {
        input.validate()?;
        let mut tx = self.begin().await?;
        let visitor_number = Self::next_number(&mut tx, PersonKind::Visitor).await?;
        let visitor: Visitor = sqlx::query_as(
            r#"
            INSERT INTO visitors (id, visitor_number, first_name, last_name, email, phone, address,
                                  visit_date, invited_by, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&visitor_number)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.visit_date)
        .bind(&input.invited_by)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(visitor)
    }

    async fn update_visitor(&self, id: Uuid, input: VisitorInput) -> StoreResult<Visitor> {
        input.validate()?;
        sqlx::query_as(
            r#"
            UPDATE visitors SET
                first_name = $2, last_name = $3, email = $4, phone = $5, address = $6,
                visit_date = $7, invited_by = $8, notes = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.visit_date)
        .bind(&input.invited_by)
        .bind(&input.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("visitor"))
    }

    async fn delete_visitor(&self, id: Uuid) -> StoreResult<()> {
        self.get_visitor(id).await?;
        let donations = self
            .count_references("SELECT COUNT(*) FROM donations WHERE visitor_id = $1", id)
            .await?;
        if donations > 0 {
            return Err(StoreError::conflict("visitor still has donations"));
        }
        sqlx::query("DELETE FROM visitors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn renumber(&self, kind: PersonKind) -> StoreResult<usize> {
        let (table, column) = match kind {
            PersonKind::Member => ("members", "member_number"),
            PersonKind::Visitor => ("visitors", "visitor_number"),
        };
        let mut tx = self.begin().await?;
        Self::lock_numbers(&mut tx, kind).await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(&format!(
            "SELECT id FROM {table} ORDER BY created_at, LENGTH({column}), {column}"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;

        // Park every row on a unique temporary value first so the new numbers
        // never collide with old ones mid-way.
        sqlx::query(&format!("UPDATE {table} SET {column} = 'tmp-' || id::text"))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let update = format!("UPDATE {table} SET {column} = $2 WHERE id = $1");
        for (id, number) in ids.iter().zip(numbering::sequence(kind, ids.len())) {
            sqlx::query(&update)
                .bind(id)
                .bind(number)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        tracing::info!("Renumbered {} {}", ids.len(), table);
        Ok(ids.len())
    }

    async fn list_donations(&self, filter: &DonationFilter) -> StoreResult<Vec<Donation>> {
        sqlx::query_as(
            r#"
            SELECT * FROM donations
            WHERE ($1::uuid IS NULL OR member_id = $1)
              AND ($2::uuid IS NULL OR visitor_id = $2)
              AND ($3::date IS NULL OR date >= $3)
              AND ($4::date IS NULL OR date <= $4)
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(filter.member_id)
        .bind(filter.visitor_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn get_donation(&self, id: Uuid) -> StoreResult<Donation> {
        sqlx::query_as("SELECT * FROM donations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("donation"))
    }

    async fn create_donation(&self, input: DonationInput) -> StoreResult<Donation> {
        let donor = input.validate()?;
        self.check_donor(donor).await?;
        sqlx::query_as(
            r#"
            INSERT INTO donations (id, amount, donation_type, date, notes, member_id, visitor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.amount)
        .bind(&input.donation_type)
        .bind(input.date)
        .bind(&input.notes)
        .bind(input.member_id)
        .bind(input.visitor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn update_donation(&self, id: Uuid, input: DonationInput) -> StoreResult<Donation> {
        let donor = input.validate()?;
        self.get_donation(id).await?;
        self.check_donor(donor).await?;
        sqlx::query_as(
            r#"
            UPDATE donations SET
                amount = $2, donation_type = $3, date = $4, notes = $5,
                member_id = $6, visitor_id = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.amount)
        .bind(&input.donation_type)
        .bind(input.date)
        .bind(&input.notes)
        .bind(input.member_id)
        .bind(input.visitor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("donation"))
    }

    async fn delete_donation(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM donations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("donation"));
        }
        Ok(())
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let mut groups: Vec<Group> = sqlx::query_as("SELECT * FROM church_groups ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        self.load_group_members(&mut groups).await?;
        Ok(groups)
    }

    async fn get_group(&self, id: Uuid) -> StoreResult<Group> {
        let group: Group = sqlx::query_as("SELECT * FROM church_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("group"))?;
        let mut groups = [group];
        self.load_group_members(&mut groups).await?;
        let [group] = groups;
        Ok(group)
    }

    async fn create_group(&self, input: GroupInput) -> StoreResult<Group> {
        input.validate()?;
        let id = Uuid::new_v4();
        let mut tx = self.begin().await?;
        sqlx::query("INSERT INTO church_groups (id, name, description) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Self::replace_group_members(&mut tx, id, &input.member_ids).await?;
        tx.commit().await.map_err(db_error)?;
        self.get_group(id).await
    }

    async fn update_group(&self, id: Uuid, input: GroupInput) -> StoreResult<Group> {
        input.validate()?;
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            "UPDATE church_groups SET name = $2, description = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("group"));
        }
        Self::replace_group_members(&mut tx, id, &input.member_ids).await?;
        tx.commit().await.map_err(db_error)?;
        self.get_group(id).await
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM church_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("group"));
        }
        Ok(())
    }

    async fn add_group_member(&self, group_id: Uuid, member_id: Uuid) -> StoreResult<Group> {
        if !self.group_exists(group_id).await? {
            return Err(StoreError::NotFound("group"));
        }
        let result = sqlx::query(
            "INSERT INTO group_members (group_id, member_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(member_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() > 0 {
            sqlx::query("UPDATE church_groups SET updated_at = NOW() WHERE id = $1")
                .bind(group_id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        self.get_group(group_id).await
    }

    async fn remove_group_member(&self, group_id: Uuid, member_id: Uuid) -> StoreResult<Group> {
        if !self.group_exists(group_id).await? {
            return Err(StoreError::NotFound("group"));
        }
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND member_id = $2")
            .bind(group_id)
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("group member"));
        }
        sqlx::query("UPDATE church_groups SET updated_at = NOW() WHERE id = $1")
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        self.get_group(group_id).await
    }

    async fn list_expense_categories(&self) -> StoreResult<Vec<ExpenseCategory>> {
        sqlx::query_as("SELECT * FROM expense_categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn get_expense_category(&self, id: Uuid) -> StoreResult<ExpenseCategory> {
        sqlx::query_as("SELECT * FROM expense_categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("expense category"))
    }

    async fn create_expense_category(
        &self,
        input: ExpenseCategoryInput,
    ) -> StoreResult<ExpenseCategory> {
        input.validate()?;
        sqlx::query_as(
            "INSERT INTO expense_categories (id, name, description) VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn update_expense_category(
        &self,
        id: Uuid,
        input: ExpenseCategoryInput,
    ) -> StoreResult<ExpenseCategory> {
        input.validate()?;
        sqlx::query_as(
            r#"
            UPDATE expense_categories SET name = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("expense category"))
    }

    async fn delete_expense_category(&self, id: Uuid) -> StoreResult<()> {
        self.get_expense_category(id).await?;
        let expenses = self
            .count_references("SELECT COUNT(*) FROM expenses WHERE category_id = $1", id)
            .await?;
        if expenses > 0 {
            return Err(StoreError::conflict("expense category still has expenses"));
        }
        sqlx::query("DELETE FROM expense_categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> StoreResult<Vec<Expense>> {
        sqlx::query_as(
            r#"
            SELECT * FROM expenses
            WHERE ($1::uuid IS NULL OR category_id = $1)
              AND ($2::date IS NULL OR date >= $2)
              AND ($3::date IS NULL OR date <= $3)
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(filter.category_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn get_expense(&self, id: Uuid) -> StoreResult<Expense> {
        sqlx::query_as("SELECT * FROM expenses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("expense"))
    }

    async fn create_expense(&self, input: ExpenseInput) -> StoreResult<Expense> {
        input.validate()?;
        sqlx::query_as(
            r#"
            INSERT INTO expenses (id, category_id, amount, date, description, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.category_id)
        .bind(input.amount)
        .bind(input.date)
        .bind(&input.description)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn update_expense(&self, id: Uuid, input: ExpenseInput) -> StoreResult<Expense> {
        input.validate()?;
        sqlx::query_as(
            r#"
            UPDATE expenses SET
                category_id = $2, amount = $3, date = $4, description = $5,
                notes = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.category_id)
        .bind(input.amount)
        .bind(input.date)
        .bind(&input.description)
        .bind(&input.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("expense"))
    }

    async fn delete_expense(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("expense"));
        }
        Ok(())
    }

    async fn list_user_levels(&self) -> StoreResult<Vec<UserLevel>> {
        sqlx::query_as("SELECT * FROM user_levels ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn get_user_level(&self, id: Uuid) -> StoreResult<UserLevel> {
        sqlx::query_as("SELECT * FROM user_levels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("user level"))
    }

    async fn create_user_level(&self, input: UserLevelInput) -> StoreResult<UserLevel> {
        input.validate()?;
        sqlx::query_as(
            r#"
            INSERT INTO user_levels (id, name, description, permissions)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(sqlx::types::Json(&input.permissions))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn update_user_level(&self, id: Uuid, input: UserLevelInput) -> StoreResult<UserLevel> {
        input.validate()?;
        sqlx::query_as(
            r#"
            UPDATE user_levels SET
                name = $2, description = $3, permissions = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(sqlx::types::Json(&input.permissions))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("user level"))
    }

    async fn delete_user_level(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM user_levels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user level"));
        }
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        sqlx::query_as("SELECT * FROM users ORDER BY LOWER(username)")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotFound("user"))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE LOWER(username) = LOWER($1)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        user.validate()?;
        sqlx::query_as(
            r#"
            INSERT INTO users (id, username, password_hash, full_name, email, member_id,
                               level_id, is_active, permissions)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.member_id)
        .bind(user.level_id)
        .bind(user.is_active)
        .bind(sqlx::types::Json(&user.permissions))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> StoreResult<User> {
        update.validate()?;
        sqlx::query_as(
            r#"
            UPDATE users SET
                username = $2,
                password_hash = COALESCE($3, password_hash),
                full_name = $4, email = $5, member_id = $6, level_id = $7,
                is_active = $8, permissions = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.username)
        .bind(&update.password_hash)
        .bind(&update.full_name)
        .bind(&update.email)
        .bind(update.member_id)
        .bind(update.level_id)
        .bind(update.is_active)
        .bind(sqlx::types::Json(&update.permissions))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::NotFound("user"))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.token)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<Session>> {
        sqlx::query_as("SELECT token, user_id, expires_at FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}
