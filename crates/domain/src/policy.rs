//! Access policy.
//!
//! The HTTP layer builds an [`Actor`] from the already-authenticated caller
//! and hands it to the services as a [`Capability`]. Services ask the
//! capability whether an [`Action`] is permitted and never inspect roles
//! themselves.

use std::collections::HashSet;

use store::UserId;

use crate::error::DomainError;

/// Something a caller may or may not be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Safe reads of products, collections and reviews.
    BrowseCatalog,
    /// Create, update or delete products and collections.
    ManageCatalog,
    /// See every order, change payment status, delete orders.
    ManageOrders,
    ViewCustomer,
    AddCustomer,
    ChangeCustomer,
    DeleteCustomer,
    /// See a customer's order history.
    ViewHistory,
}

impl Action {
    /// Permission codename granted to a user, if the action is governed by one.
    pub fn codename(&self) -> Option<&'static str> {
        match self {
            Action::ViewCustomer => Some("view_customer"),
            Action::AddCustomer => Some("add_customer"),
            Action::ChangeCustomer => Some("change_customer"),
            Action::DeleteCustomer => Some("delete_customer"),
            Action::ViewHistory => Some("view_history"),
            Action::BrowseCatalog | Action::ManageCatalog | Action::ManageOrders => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::BrowseCatalog => "browse catalog",
            Action::ManageCatalog => "manage catalog",
            Action::ManageOrders => "manage orders",
            Action::ViewCustomer => "view customer",
            Action::AddCustomer => "add customer",
            Action::ChangeCustomer => "change customer",
            Action::DeleteCustomer => "delete customer",
            Action::ViewHistory => "view history",
        };
        write!(f, "{name}")
    }
}

/// A permission check handed into the services.
pub trait Capability: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn permits(&self, action: Action) -> bool;
}

/// Fails unless `capability` permits `action`.
///
/// Anonymous callers get `Unauthenticated`, identified ones `PermissionDenied`.
pub fn authorize(capability: &dyn Capability, action: Action) -> Result<(), DomainError> {
    if capability.permits(action) {
        return Ok(());
    }
    if !capability.is_authenticated() {
        return Err(DomainError::Unauthenticated);
    }
    Err(DomainError::PermissionDenied(action))
}

/// The caller of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub is_staff: bool,
    pub permissions: HashSet<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn staff(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            is_staff: true,
            ..Self::default()
        }
    }

    /// Adds a granted permission codename.
    pub fn with_permission(mut self, codename: impl Into<String>) -> Self {
        self.permissions.insert(codename.into());
        self
    }

    /// Returns the user id, or `Unauthenticated` for anonymous callers.
    pub fn require_user(&self) -> Result<UserId, DomainError> {
        self.user_id.ok_or(DomainError::Unauthenticated)
    }
}

pub fn is_authenticated(actor: &Actor) -> bool {
    actor.user_id.is_some()
}

pub fn is_admin(actor: &Actor) -> bool {
    is_authenticated(actor) && actor.is_staff
}

/// Safe requests are open to everyone; anything else needs staff.
pub fn is_admin_or_read_only(actor: &Actor, safe: bool) -> bool {
    safe || is_admin(actor)
}

/// The user was granted the codename `action` maps to.
pub fn has_model_permission(actor: &Actor, action: Action) -> bool {
    is_authenticated(actor)
        && action
            .codename()
            .is_some_and(|codename| actor.permissions.contains(codename))
}

pub fn can_view_history(actor: &Actor) -> bool {
    has_model_permission(actor, Action::ViewHistory)
}

impl Capability for Actor {
    fn is_authenticated(&self) -> bool {
        is_authenticated(self)
    }

    fn permits(&self, action: Action) -> bool {
        match action {
            Action::BrowseCatalog => is_admin_or_read_only(self, true),
            Action::ManageCatalog => is_admin_or_read_only(self, false),
            Action::ManageOrders => is_admin(self),
            Action::ViewHistory => can_view_history(self),
            Action::ViewCustomer
            | Action::AddCustomer
            | Action::ChangeCustomer
            | Action::DeleteCustomer => has_model_permission(self, action),
        }
    }
}
