//! Billable: customer, payment method, subscription and checkout operations
//! delegated to a payments provider. The provider's customer id is kept in
//! the owner's `stripe_id` column.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::ModelInstance;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentsError {
    #[error("{model} {id} is not a payments customer")]
    NotACustomer { model: String, id: String },
    #[error("{model} {id} is already a payments customer ({customer})")]
    AlreadyCustomer {
        model: String,
        id: String,
        customer: String,
    },
    #[error("No {kind} subscription found")]
    NoSubscription { kind: String },
    #[error("Invalid payments request: {message}")]
    InvalidRequest { message: String },
    #[error("Payments provider error: {message}")]
    Provider { message: String },
}

impl PaymentsError {
    pub fn provider(message: &str) -> Self {
        Self::Provider {
            message: message.to_string(),
        }
    }

    pub fn invalid(message: &str) -> Self {
        Self::InvalidRequest {
            message: message.to_string(),
        }
    }
}

impl From<PaymentsError> for ModelError {
    fn from(err: PaymentsError) -> Self {
        ModelError::Payments(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerParams {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    /// `card`, `sepa_debit`, ...
    pub kind: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Application-level subscription name, e.g. `"pro"`
    pub kind: String,
    pub price_lookup_key: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub latest_payment_intent: Option<PaymentIntent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub kind: String,
    pub price_lookup_key: String,
    #[serde(default)]
    pub collection_method: Option<String>,
    #[serde(default)]
    pub days_until_due: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub price_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl CheckoutLineItem {
    pub fn new(price_id: &str, quantity: u32) -> Self {
        Self {
            price_id: price_id.to_string(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutOptions {
    #[serde(default)]
    pub enable_tax: bool,
    #[serde(default)]
    pub allow_promotions: bool,
    /// Defaults to `payment`
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer: String,
    pub mode: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub automatic_tax: bool,
    pub allow_promotion_codes: bool,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Payments collaborator
#[async_trait]
pub trait PaymentsProvider: Send + Sync {
    async fn create_customer(&self, params: &CustomerParams) -> Result<Customer, PaymentsError>;

    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, PaymentsError>;

    async fn update_customer(
        &self,
        customer_id: &str,
        params: &CustomerParams,
    ) -> Result<Customer, PaymentsError>;

    async fn delete_customer(&self, customer_id: &str) -> Result<(), PaymentsError>;

    async fn attach_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, PaymentsError>;

    async fn update_payment_method(
        &self,
        payment_method_id: &str,
        params: &Value,
    ) -> Result<PaymentMethod, PaymentsError>;

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, PaymentsError>;

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<Option<PaymentMethod>, PaymentsError>;

    async fn list_payment_methods(
        &self,
        customer_id: &str,
        kind: Option<&str>,
    ) -> Result<Vec<PaymentMethod>, PaymentsError>;

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<Customer, PaymentsError>;

    async fn create_subscription(
        &self,
        customer_id: &str,
        request: &SubscriptionRequest,
    ) -> Result<Subscription, PaymentsError>;

    async fn cancel_subscription(&self, subscription_id: &str)
        -> Result<Subscription, PaymentsError>;

    async fn list_subscriptions(&self, customer_id: &str)
        -> Result<Vec<Subscription>, PaymentsError>;

    async fn create_payment_intent(
        &self,
        customer_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentsError>;

    async fn create_setup_intent(
        &self,
        customer_id: &str,
        metadata: &Value,
    ) -> Result<SetupIntent, PaymentsError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentsError>;
}

const CUSTOMER_COLUMN: &str = "stripe_id";

pub struct Billable<'a> {
    db: &'a Database,
    owner: &'a mut ModelInstance,
}

impl<'a> Billable<'a> {
    pub(crate) fn new(db: &'a Database, owner: &'a mut ModelInstance) -> ModelResult<Self> {
        owner
            .model()
            .require_trait(owner.model().traits.billable, "billable")?;
        Ok(Self { db, owner })
    }

    fn provider(&self) -> ModelResult<&'a dyn PaymentsProvider> {
        Ok(&**self.db.payments()?)
    }

    /// Provider customer id, if any
    pub fn stripe_id(&self) -> Option<String> {
        self.owner
            .get(CUSTOMER_COLUMN)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    pub fn has_stripe_id(&self) -> bool {
        self.stripe_id().is_some()
    }

    fn require_customer(&self) -> ModelResult<String> {
        self.stripe_id().ok_or_else(|| {
            PaymentsError::NotACustomer {
                model: self.owner.model_name().to_string(),
                id: self
                    .owner
                    .id()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            }
            .into()
        })
    }

    async fn store_customer_id(&mut self, customer_id: Option<&str>) -> ModelResult<()> {
        let mut values = serde_json::Map::new();
        values.insert(
            CUSTOMER_COLUMN.to_string(),
            customer_id.map(Value::from).unwrap_or(Value::Null),
        );
        self.owner.force_update(self.db, Value::Object(values)).await
    }

    pub async fn create_customer(&mut self, params: CustomerParams) -> ModelResult<Customer> {
        if let Some(existing) = self.stripe_id() {
            return Err(PaymentsError::AlreadyCustomer {
                model: self.owner.model_name().to_string(),
                id: self
                    .owner
                    .id()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                customer: existing,
            }
            .into());
        }

        let customer = self.provider()?.create_customer(&params).await?;
        self.store_customer_id(Some(&customer.id)).await?;
        info!(
            "Created payments customer {} for {}",
            customer.id,
            self.owner.model_name()
        );
        Ok(customer)
    }

    pub async fn create_or_get_customer(&mut self, params: CustomerParams) -> ModelResult<Customer> {
        if self.has_stripe_id() {
            return self.retrieve_customer().await;
        }
        self.create_customer(params).await
    }

    pub async fn retrieve_customer(&self) -> ModelResult<Customer> {
        let customer_id = self.require_customer()?;
        Ok(self.provider()?.retrieve_customer(&customer_id).await?)
    }

    pub async fn update_customer(&self, params: CustomerParams) -> ModelResult<Customer> {
        let customer_id = self.require_customer()?;
        Ok(self
            .provider()?
            .update_customer(&customer_id, &params)
            .await?)
    }

    /// Deletes the provider customer and clears `stripe_id`
    pub async fn delete_customer(&mut self) -> ModelResult<()> {
        let customer_id = self.require_customer()?;
        self.provider()?.delete_customer(&customer_id).await?;
        self.store_customer_id(None).await
    }

    /// Creates the customer when missing, then pushes `params` to it
    pub async fn sync_customer_details(&mut self, params: CustomerParams) -> ModelResult<Customer> {
        if !self.has_stripe_id() {
            return self.create_customer(params).await;
        }
        self.update_customer(params).await
    }

    pub async fn add_payment_method(&self, payment_method_id: &str) -> ModelResult<PaymentMethod> {
        let customer_id = self.require_customer()?;
        Ok(self
            .provider()?
            .attach_payment_method(&customer_id, payment_method_id)
            .await?)
    }

    pub async fn update_payment_method(
        &self,
        payment_method_id: &str,
        params: Value,
    ) -> ModelResult<PaymentMethod> {
        self.require_customer()?;
        Ok(self
            .provider()?
            .update_payment_method(payment_method_id, &params)
            .await?)
    }

    pub async fn delete_payment_method(&self, payment_method_id: &str) -> ModelResult<PaymentMethod> {
        self.require_customer()?;
        Ok(self
            .provider()?
            .detach_payment_method(payment_method_id)
            .await?)
    }

    pub async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> ModelResult<Option<PaymentMethod>> {
        self.require_customer()?;
        Ok(self
            .provider()?
            .retrieve_payment_method(payment_method_id)
            .await?)
    }

    pub async fn payment_methods(&self, kind: Option<&str>) -> ModelResult<Vec<PaymentMethod>> {
        let customer_id = self.require_customer()?;
        Ok(self
            .provider()?
            .list_payment_methods(&customer_id, kind)
            .await?)
    }

    /// The customer's default payment method, if one is set
    pub async fn default_payment_method(&self) -> ModelResult<Option<PaymentMethod>> {
        let customer = self.retrieve_customer().await?;
        match customer.default_payment_method {
            Some(payment_method_id) => self.retrieve_payment_method(&payment_method_id).await,
            None => Ok(None),
        }
    }

    pub async fn set_default_payment_method(&self, payment_method_id: &str) -> ModelResult<Customer> {
        let customer_id = self.require_customer()?;
        Ok(self
            .provider()?
            .set_default_payment_method(&customer_id, payment_method_id)
            .await?)
    }

    /// Subscribes the customer to `price_lookup_key` under the name `kind`
    pub async fn new_subscription(
        &self,
        kind: &str,
        price_lookup_key: &str,
    ) -> ModelResult<Subscription> {
        let customer_id = self.require_customer()?;
        let request = SubscriptionRequest {
            kind: kind.to_string(),
            price_lookup_key: price_lookup_key.to_string(),
            collection_method: None,
            days_until_due: None,
        };
        let subscription = self
            .provider()?
            .create_subscription(&customer_id, &request)
            .await?;
        debug!("Subscription {} created for {}", subscription.id, customer_id);
        Ok(subscription)
    }

    /// Same as `new_subscription`, billed by invoice due in 15 days
    pub async fn new_subscription_invoice(
        &self,
        kind: &str,
        price_lookup_key: &str,
    ) -> ModelResult<Subscription> {
        let customer_id = self.require_customer()?;
        let request = SubscriptionRequest {
            kind: kind.to_string(),
            price_lookup_key: price_lookup_key.to_string(),
            collection_method: Some("send_invoice".to_string()),
            days_until_due: Some(15),
        };
        Ok(self
            .provider()?
            .create_subscription(&customer_id, &request)
            .await?)
    }

    async fn subscription(&self, kind: &str) -> ModelResult<Option<Subscription>> {
        let customer_id = match self.stripe_id() {
            Some(id) => id,
            None => return Ok(None),
        };
        let subscriptions = self.provider()?.list_subscriptions(&customer_id).await?;
        Ok(subscriptions.into_iter().find(|s| s.kind == kind))
    }

    pub async fn cancel_subscription(&self, kind: &str) -> ModelResult<Subscription> {
        self.require_customer()?;
        let subscription = self
            .subscription(kind)
            .await?
            .ok_or_else(|| PaymentsError::NoSubscription {
                kind: kind.to_string(),
            })?;
        Ok(self
            .provider()?
            .cancel_subscription(&subscription.id)
            .await?)
    }

    /// Active or trialing subscription named `kind`
    pub async fn is_subscribed(&self, kind: &str) -> ModelResult<bool> {
        Ok(self
            .subscription(kind)
            .await?
            .map(|s| s.status.is_valid())
            .unwrap_or(false))
    }

    pub async fn is_incomplete(&self, kind: &str) -> ModelResult<bool> {
        Ok(self
            .subscription(kind)
            .await?
            .map(|s| s.status == SubscriptionStatus::Incomplete)
            .unwrap_or(false))
    }

    /// One-off charge; `currency` defaults to `usd`
    pub async fn payment_intent(&self, amount: i64, currency: Option<&str>) -> ModelResult<PaymentIntent> {
        let customer_id = self.require_customer()?;
        if amount <= 0 {
            return Err(PaymentsError::invalid("amount must be positive").into());
        }
        Ok(self
            .provider()?
            .create_payment_intent(&customer_id, amount, currency.unwrap_or("usd"))
            .await?)
    }

    pub async fn create_setup_intent(&self, metadata: Value) -> ModelResult<SetupIntent> {
        let customer_id = self.require_customer()?;
        Ok(self
            .provider()?
            .create_setup_intent(&customer_id, &metadata)
            .await?)
    }

    /// Checkout session for `items`; creates the customer when missing
    pub async fn checkout(
        &mut self,
        items: Vec<CheckoutLineItem>,
        options: CheckoutOptions,
    ) -> ModelResult<CheckoutSession> {
        if items.is_empty() {
            return Err(PaymentsError::invalid("checkout needs at least one line item").into());
        }

        let customer = self.create_or_get_customer(CustomerParams::default()).await?;
        let request = CheckoutRequest {
            customer: customer.id,
            mode: options.mode.unwrap_or_else(|| "payment".to_string()),
            line_items: items,
            automatic_tax: options.enable_tax,
            allow_promotion_codes: options.allow_promotions,
            success_url: options.success_url,
            cancel_url: options.cancel_url,
        };
        Ok(self.provider()?.create_checkout_session(&request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCompiler;
    use crate::schema::{AttributeDefinition, ModelSchema, TraitFlags};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingPayments {
        customers: Mutex<Vec<Customer>>,
        subscriptions: Mutex<Vec<(String, Subscription)>>,
        checkouts: Mutex<Vec<CheckoutRequest>>,
    }

    #[async_trait]
    impl PaymentsProvider for RecordingPayments {
        async fn create_customer(&self, params: &CustomerParams) -> Result<Customer, PaymentsError> {
            let mut customers = self.customers.lock().unwrap();
            let customer = Customer {
                id: format!("cus_{}", customers.len() + 1),
                email: params.email.clone(),
                name: params.name.clone(),
                default_payment_method: None,
            };
            customers.push(customer.clone());
            Ok(customer)
        }

        async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, PaymentsError> {
            self.customers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == customer_id)
                .cloned()
                .ok_or_else(|| PaymentsError::provider("no such customer"))
        }

        async fn update_customer(
            &self,
            customer_id: &str,
            params: &CustomerParams,
        ) -> Result<Customer, PaymentsError> {
            let mut customers = self.customers.lock().unwrap();
            let customer = customers
                .iter_mut()
                .find(|c| c.id == customer_id)
                .ok_or_else(|| PaymentsError::provider("no such customer"))?;
            if params.email.is_some() {
                customer.email = params.email.clone();
            }
            if params.name.is_some() {
                customer.name = params.name.clone();
            }
            Ok(customer.clone())
        }

        async fn delete_customer(&self, customer_id: &str) -> Result<(), PaymentsError> {
            self.customers.lock().unwrap().retain(|c| c.id != customer_id);
            Ok(())
        }

        async fn attach_payment_method(
            &self,
            _customer_id: &str,
            payment_method_id: &str,
        ) -> Result<PaymentMethod, PaymentsError> {
            Ok(card(payment_method_id))
        }

        async fn update_payment_method(
            &self,
            payment_method_id: &str,
            _params: &Value,
        ) -> Result<PaymentMethod, PaymentsError> {
            Ok(card(payment_method_id))
        }

        async fn detach_payment_method(
            &self,
            payment_method_id: &str,
        ) -> Result<PaymentMethod, PaymentsError> {
            Ok(card(payment_method_id))
        }

        async fn retrieve_payment_method(
            &self,
            payment_method_id: &str,
        ) -> Result<Option<PaymentMethod>, PaymentsError> {
            Ok(Some(card(payment_method_id)))
        }

        async fn list_payment_methods(
            &self,
            _customer_id: &str,
            _kind: Option<&str>,
        ) -> Result<Vec<PaymentMethod>, PaymentsError> {
            Ok(vec![card("pm_1")])
        }

        async fn set_default_payment_method(
            &self,
            customer_id: &str,
            payment_method_id: &str,
        ) -> Result<Customer, PaymentsError> {
            let mut customers = self.customers.lock().unwrap();
            let customer = customers
                .iter_mut()
                .find(|c| c.id == customer_id)
                .ok_or_else(|| PaymentsError::provider("no such customer"))?;
            customer.default_payment_method = Some(payment_method_id.to_string());
            Ok(customer.clone())
        }

        async fn create_subscription(
            &self,
            customer_id: &str,
            request: &SubscriptionRequest,
        ) -> Result<Subscription, PaymentsError> {
            let subscription = Subscription {
                id: format!("sub_{}", request.kind),
                kind: request.kind.clone(),
                price_lookup_key: request.price_lookup_key.clone(),
                status: SubscriptionStatus::Active,
                latest_payment_intent: None,
            };
            self.subscriptions
                .lock()
                .unwrap()
                .push((customer_id.to_string(), subscription.clone()));
            Ok(subscription)
        }

        async fn cancel_subscription(
            &self,
            subscription_id: &str,
        ) -> Result<Subscription, PaymentsError> {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            let (_, subscription) = subscriptions
                .iter_mut()
                .find(|(_, s)| s.id == subscription_id)
                .ok_or_else(|| PaymentsError::provider("no such subscription"))?;
            subscription.status = SubscriptionStatus::Canceled;
            Ok(subscription.clone())
        }

        async fn list_subscriptions(
            &self,
            customer_id: &str,
        ) -> Result<Vec<Subscription>, PaymentsError> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .filter(|(owner, _)| owner == customer_id)
                .map(|(_, s)| s.clone())
                .collect())
        }

        async fn create_payment_intent(
            &self,
            _customer_id: &str,
            amount: i64,
            currency: &str,
        ) -> Result<PaymentIntent, PaymentsError> {
            Ok(PaymentIntent {
                id: "pi_1".to_string(),
                amount,
                currency: currency.to_string(),
                status: "requires_payment_method".to_string(),
                client_secret: None,
            })
        }

        async fn create_setup_intent(
            &self,
            _customer_id: &str,
            _metadata: &Value,
        ) -> Result<SetupIntent, PaymentsError> {
            Ok(SetupIntent {
                id: "seti_1".to_string(),
                client_secret: Some("secret".to_string()),
            })
        }

        async fn create_checkout_session(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, PaymentsError> {
            self.checkouts.lock().unwrap().push(request.clone());
            Ok(CheckoutSession {
                id: "cs_1".to_string(),
                url: Some("https://checkout.test/cs_1".to_string()),
            })
        }
    }

    fn card(id: &str) -> PaymentMethod {
        PaymentMethod {
            id: id.to_string(),
            kind: "card".to_string(),
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
        }
    }

    fn database(payments: Arc<RecordingPayments>) -> Database {
        let registry = ModelCompiler::new()
            .add(
                ModelSchema::new("User")
                    .attribute("email", AttributeDefinition::string().fillable())
                    .traits(TraitFlags {
                        billable: true,
                        ..TraitFlags::default()
                    }),
            )
            .unwrap()
            .compile()
            .unwrap();
        Database::memory(registry).with_payments(payments)
    }

    #[tokio::test]
    async fn test_customer_lifecycle_persists_stripe_id() {
        let payments = Arc::new(RecordingPayments::default());
        let db = database(payments.clone());
        let mut user = db
            .model("User")
            .unwrap()
            .create(json!({ "email": "ada@example.com" }))
            .await
            .unwrap();
        let id = user.id().unwrap();

        let params = CustomerParams {
            email: Some("ada@example.com".to_string()),
            ..CustomerParams::default()
        };
        let customer = user.billable(&db).unwrap().create_customer(params.clone()).await.unwrap();
        assert_eq!(customer.id, "cus_1");
        assert_eq!(user.get("stripe_id"), Some(&json!("cus_1")));

        let stored = db.model("User").unwrap().find_or_fail(id).await.unwrap();
        assert_eq!(stored.get("stripe_id"), Some(&json!("cus_1")));

        let again = user.billable(&db).unwrap().create_or_get_customer(params.clone()).await.unwrap();
        assert_eq!(again.id, "cus_1");
        assert!(matches!(
            user.billable(&db).unwrap().create_customer(params).await,
            Err(ModelError::Payments(_))
        ));

        user.billable(&db).unwrap().delete_customer().await.unwrap();
        assert!(!user.billable(&db).unwrap().has_stripe_id());
        assert!(payments.customers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operations_need_a_customer() {
        let db = database(Arc::new(RecordingPayments::default()));
        let mut user = db.model("User").unwrap().create(json!({})).await.unwrap();
        let billing = user.billable(&db).unwrap();

        assert!(matches!(
            billing.payment_intent(500, None).await,
            Err(ModelError::Payments(_))
        ));
        assert!(matches!(
            billing.payment_methods(None).await,
            Err(ModelError::Payments(_))
        ));
        assert!(!billing.is_subscribed("pro").await.unwrap());
    }

    #[tokio::test]
    async fn test_subscriptions_and_charges() {
        let db = database(Arc::new(RecordingPayments::default()));
        let mut user = db.model("User").unwrap().create(json!({})).await.unwrap();
        let mut billing = user.billable(&db).unwrap();
        billing.create_customer(CustomerParams::default()).await.unwrap();

        billing.new_subscription("pro", "pro_monthly").await.unwrap();
        assert!(billing.is_subscribed("pro").await.unwrap());
        assert!(!billing.is_incomplete("pro").await.unwrap());
        assert!(!billing.is_subscribed("team").await.unwrap());

        let canceled = billing.cancel_subscription("pro").await.unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert!(!billing.is_subscribed("pro").await.unwrap());

        let intent = billing.payment_intent(1999, None).await.unwrap();
        assert_eq!(intent.currency, "usd");
        assert_eq!(intent.amount, 1999);

        billing.set_default_payment_method("pm_9").await.unwrap();
        let default = billing.default_payment_method().await.unwrap().unwrap();
        assert_eq!(default.id, "pm_9");
    }

    #[tokio::test]
    async fn test_checkout_creates_customer_and_defaults() {
        let payments = Arc::new(RecordingPayments::default());
        let db = database(payments.clone());
        let mut user = db.model("User").unwrap().create(json!({})).await.unwrap();

        let session = user
            .billable(&db)
            .unwrap()
            .checkout(
                vec![CheckoutLineItem::new("price_1", 2)],
                CheckoutOptions {
                    enable_tax: true,
                    ..CheckoutOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(session.id, "cs_1");
        assert_eq!(user.get("stripe_id"), Some(&json!("cus_1")));

        let checkouts = payments.checkouts.lock().unwrap();
        assert_eq!(checkouts[0].mode, "payment");
        assert_eq!(checkouts[0].customer, "cus_1");
        assert!(checkouts[0].automatic_tax);
        assert!(!checkouts[0].allow_promotion_codes);

        let item: CheckoutLineItem = serde_json::from_value(json!({ "price_id": "p" })).unwrap();
        assert_eq!(item.quantity, 1);
    }
}
