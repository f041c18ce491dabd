//! Customer profiles.

use chrono::NaiveDate;
use store::{
    Customer, CustomerId, CustomerProfile, CustomerStore, Membership, Order, OrderStore, UserId,
};

use crate::error::DomainError;
use crate::policy::{Action, Capability, authorize};

/// Longest phone number accepted.
pub const MAX_PHONE_LEN: usize = 255;

/// Outcome of [`CustomerService::find_or_create_customer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerLookup {
    /// The user already had a customer profile.
    Found(Customer),
    /// A blank profile was provisioned by this call.
    Created(Customer),
}

impl CustomerLookup {
    pub fn customer(&self) -> &Customer {
        match self {
            CustomerLookup::Found(c) | CustomerLookup::Created(c) => c,
        }
    }

    pub fn into_customer(self) -> Customer {
        match self {
            CustomerLookup::Found(c) | CustomerLookup::Created(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, CustomerLookup::Created(_))
    }
}

/// A profile edit. The phone is always replaced; absent optional fields keep
/// their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub phone: String,
    /// `Some(None)` clears the stored birth date.
    pub birth_date: Option<Option<NaiveDate>>,
    pub membership: Option<Membership>,
}

impl ProfileChanges {
    /// Overlays the changes onto `customer`'s current profile.
    pub fn apply_to(self, customer: &Customer) -> CustomerProfile {
        CustomerProfile {
            phone: self.phone,
            birth_date: self.birth_date.unwrap_or(customer.birth_date),
            membership: self.membership.unwrap_or(customer.membership),
        }
    }
}

fn validate_profile(profile: &CustomerProfile) -> Result<(), DomainError> {
    if profile.phone.chars().count() > MAX_PHONE_LEN {
        return Err(DomainError::Validation(format!(
            "phone must be at most {MAX_PHONE_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CustomerService<S> {
    store: S,
}

impl<S: CustomerStore + OrderStore> CustomerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's customer, provisioning a blank one on first access.
    #[tracing::instrument(skip(self))]
    pub async fn find_or_create_customer(
        &self,
        user_id: UserId,
    ) -> Result<CustomerLookup, DomainError> {
        let (customer, created) = self.store.find_or_insert_customer(user_id).await?;
        if created {
            tracing::info!(customer_id = %customer.id, %user_id, "customer provisioned");
            return Ok(CustomerLookup::Created(customer));
        }
        Ok(CustomerLookup::Found(customer))
    }

    /// The caller's own profile.
    pub async fn me(&self, user_id: UserId) -> Result<Customer, DomainError> {
        Ok(self.find_or_create_customer(user_id).await?.into_customer())
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update_me(
        &self,
        user_id: UserId,
        changes: ProfileChanges,
    ) -> Result<Customer, DomainError> {
        let customer = self.me(user_id).await?;
        let profile = changes.apply_to(&customer);
        validate_profile(&profile)?;
        Ok(self.store.update_customer(customer.id, profile).await?)
    }

    pub async fn list_customers(
        &self,
        capability: &dyn Capability,
    ) -> Result<Vec<Customer>, DomainError> {
        authorize(capability, Action::ViewCustomer)?;
        Ok(self.store.list_customers().await?)
    }

    pub async fn get_customer(
        &self,
        capability: &dyn Capability,
        id: CustomerId,
    ) -> Result<Customer, DomainError> {
        authorize(capability, Action::ViewCustomer)?;
        self.load(id).await
    }

    #[tracing::instrument(skip(self, capability, changes))]
    pub async fn update_customer(
        &self,
        capability: &dyn Capability,
        id: CustomerId,
        changes: ProfileChanges,
    ) -> Result<Customer, DomainError> {
        authorize(capability, Action::ChangeCustomer)?;
        let customer = self.load(id).await?;
        let profile = changes.apply_to(&customer);
        validate_profile(&profile)?;
        Ok(self.store.update_customer(id, profile).await?)
    }

    /// Refused with `Protected` while the customer owns orders.
    #[tracing::instrument(skip(self, capability))]
    pub async fn delete_customer(
        &self,
        capability: &dyn Capability,
        id: CustomerId,
    ) -> Result<(), DomainError> {
        authorize(capability, Action::DeleteCustomer)?;
        Ok(self.store.delete_customer(id).await?)
    }

    /// Every order the customer placed, oldest first.
    #[tracing::instrument(skip(self, capability))]
    pub async fn customer_history(
        &self,
        capability: &dyn Capability,
        id: CustomerId,
    ) -> Result<Vec<Order>, DomainError> {
        authorize(capability, Action::ViewHistory)?;
        self.load(id).await?;
        Ok(self.store.list_orders(Some(id)).await?)
    }

    async fn load(&self, id: CustomerId) -> Result<Customer, DomainError> {
        self.store
            .get_customer(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Customer", id))
    }
}
