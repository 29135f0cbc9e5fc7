//! # Permission flags
//!
//! Every user carries a flat record of booleans, three per [`Resource`]:
//!
//! | Flag | Meaning |
//! |------|---------|
//! | `<resource>Access` | may view the resource and edit existing records |
//! | `canAdd<Resource>` | may create new records |
//! | `cannotDelete<Resource>` | deletion is forbidden even with access |
//!
//! There is no inheritance or composition between flags. [`PermissionFlags::allows`]
//! is the single evaluation point; the `has_*` helpers mirror the names the
//! frontend uses (`hasAddAccess`, `hasDeleteAccess`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource type guarded by its own set of flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Member,
    Visitor,
    Donation,
    Group,
    Expense,
    ExpenseCategory,
    ProgramOwner,
    User,
    UserLevel,
    Report,
}

impl Resource {
    pub const ALL: [Resource; 10] = [
        Resource::Member,
        Resource::Visitor,
        Resource::Donation,
        Resource::Group,
        Resource::Expense,
        Resource::ExpenseCategory,
        Resource::ProgramOwner,
        Resource::User,
        Resource::UserLevel,
        Resource::Report,
    ];

    /// Human-readable name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Resource::Member => "members",
            Resource::Visitor => "visitors",
            Resource::Donation => "donations",
            Resource::Group => "groups",
            Resource::Expense => "expenses",
            Resource::ExpenseCategory => "expense categories",
            Resource::ProgramOwner => "program owner",
            Resource::User => "users",
            Resource::UserLevel => "user levels",
            Resource::Report => "reports",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a request wants to do with a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    View,
    Add,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Add, Action::Edit, Action::Delete];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Edit => "edit",
            Action::Delete => "delete",
        })
    }
}

/// The three flags of a single resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePermissions {
    pub access: bool,
    pub can_add: bool,
    pub cannot_delete: bool,
}

impl ResourcePermissions {
    pub const FULL: ResourcePermissions = ResourcePermissions {
        access: true,
        can_add: true,
        cannot_delete: false,
    };

    pub const READ_ONLY: ResourcePermissions = ResourcePermissions {
        access: true,
        can_add: false,
        cannot_delete: true,
    };

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View | Action::Edit => self.access,
            Action::Add => self.access && self.can_add,
            Action::Delete => self.access && !self.cannot_delete,
        }
    }
}

/// The full flag record stored on a user or a user level.
///
/// Missing fields deserialize as `false`, so a partial JSON object grants only
/// what it names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionFlags {
    pub member_access: bool,
    pub can_add_member: bool,
    pub cannot_delete_member: bool,

    pub visitor_access: bool,
    pub can_add_visitor: bool,
    pub cannot_delete_visitor: bool,

    pub donation_access: bool,
    pub can_add_donation: bool,
    pub cannot_delete_donation: bool,

    pub group_access: bool,
    pub can_add_group: bool,
    pub cannot_delete_group: bool,

    pub expense_access: bool,
    pub can_add_expense: bool,
    pub cannot_delete_expense: bool,

    pub expense_category_access: bool,
    pub can_add_expense_category: bool,
    pub cannot_delete_expense_category: bool,

    pub program_owner_access: bool,
    pub can_add_program_owner: bool,
    pub cannot_delete_program_owner: bool,

    pub user_access: bool,
    pub can_add_user: bool,
    pub cannot_delete_user: bool,

    pub user_level_access: bool,
    pub can_add_user_level: bool,
    pub cannot_delete_user_level: bool,

    pub report_access: bool,
    pub can_add_report: bool,
    pub cannot_delete_report: bool,
}

impl PermissionFlags {
    /// No access to anything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Full access to every resource.
    pub fn all() -> Self {
        Self::uniform(ResourcePermissions::FULL)
    }

    /// The same flags on every resource.
    pub fn uniform(perms: ResourcePermissions) -> Self {
        let mut flags = Self::none();
        for resource in Resource::ALL {
            flags.set(resource, perms);
        }
        flags
    }

    pub fn get(&self, resource: Resource) -> ResourcePermissions {
        let (access, can_add, cannot_delete) = match resource {
            Resource::Member => (
                self.member_access,
                self.can_add_member,
                self.cannot_delete_member,
            ),
            Resource::Visitor => (
                self.visitor_access,
                self.can_add_visitor,
                self.cannot_delete_visitor,
            ),
            Resource::Donation => (
                self.donation_access,
                self.can_add_donation,
                self.cannot_delete_donation,
            ),
            Resource::Group => (self.group_access, self.can_add_group, self.cannot_delete_group),
            Resource::Expense => (
                self.expense_access,
                self.can_add_expense,
                self.cannot_delete_expense,
            ),
            Resource::ExpenseCategory => (
                self.expense_category_access,
                self.can_add_expense_category,
                self.cannot_delete_expense_category,
            ),
            Resource::ProgramOwner => (
                self.program_owner_access,
                self.can_add_program_owner,
                self.cannot_delete_program_owner,
            ),
            Resource::User => (self.user_access, self.can_add_user, self.cannot_delete_user),
            Resource::UserLevel => (
                self.user_level_access,
                self.can_add_user_level,
                self.cannot_delete_user_level,
            ),
            Resource::Report => (
                self.report_access,
                self.can_add_report,
                self.cannot_delete_report,
            ),
        };
        ResourcePermissions {
            access,
            can_add,
            cannot_delete,
        }
    }

    pub fn set(&mut self, resource: Resource, perms: ResourcePermissions) {
        let (access, can_add, cannot_delete) = match resource {
            Resource::Member => (
                &mut self.member_access,
                &mut self.can_add_member,
                &mut self.cannot_delete_member,
            ),
            Resource::Visitor => (
                &mut self.visitor_access,
                &mut self.can_add_visitor,
                &mut self.cannot_delete_visitor,
            ),
            Resource::Donation => (
                &mut self.donation_access,
                &mut self.can_add_donation,
                &mut self.cannot_delete_donation,
            ),
            Resource::Group => (
                &mut self.group_access,
                &mut self.can_add_group,
                &mut self.cannot_delete_group,
            ),
            Resource::Expense => (
                &mut self.expense_access,
                &mut self.can_add_expense,
                &mut self.cannot_delete_expense,
            ),
            Resource::ExpenseCategory => (
                &mut self.expense_category_access,
                &mut self.can_add_expense_category,
                &mut self.cannot_delete_expense_category,
            ),
            Resource::ProgramOwner => (
                &mut self.program_owner_access,
                &mut self.can_add_program_owner,
                &mut self.cannot_delete_program_owner,
            ),
            Resource::User => (
                &mut self.user_access,
                &mut self.can_add_user,
                &mut self.cannot_delete_user,
            ),
            Resource::UserLevel => (
                &mut self.user_level_access,
                &mut self.can_add_user_level,
                &mut self.cannot_delete_user_level,
            ),
            Resource::Report => (
                &mut self.report_access,
                &mut self.can_add_report,
                &mut self.cannot_delete_report,
            ),
        };
        *access = perms.access;
        *can_add = perms.can_add;
        *cannot_delete = perms.cannot_delete;
    }

    /// Builder variant of [`set`](Self::set).
    pub fn with(mut self, resource: Resource, perms: ResourcePermissions) -> Self {
        self.set(resource, perms);
        self
    }

    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.get(resource).allows(action)
    }

    pub fn has_access(&self, resource: Resource) -> bool {
        self.allows(resource, Action::View)
    }

    pub fn has_add_access(&self, resource: Resource) -> bool {
        self.allows(resource, Action::Add)
    }

    pub fn has_delete_access(&self, resource: Resource) -> bool {
        self.allows(resource, Action::Delete)
    }

    /// True when every action these flags allow is also allowed by `limit`.
    pub fn within(&self, limit: &PermissionFlags) -> bool {
        Resource::ALL.iter().all(|&resource| {
            Action::ALL
                .iter()
                .all(|&action| !self.allows(resource, action) || limit.allows(resource, action))
        })
    }
}
