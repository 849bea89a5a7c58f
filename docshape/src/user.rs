//! User accounts stored through a docshape collection.
//!
//! [`User`] shows the behaviours working together: its schema marks `password`
//! private so it never leaves the store in a public representation, timestamps are
//! managed by the collection, and [`UserRepository`] pages users straight into their
//! public JSON form.

use bcrypt::{DEFAULT_COST, hash, verify};
use bson::Uuid;
use docshape_core::{
    backend::StoreBackend,
    collection::TypedCollection,
    document::{Document, ID_FIELD},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{PageOptions, PageResult},
    query::{Expr, Filter},
    schema::Schema,
    store::DocumentStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};
use validator::{Validate, ValidationError};

/// Access level of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_password_excludes_name", skip_on_field_errors = false))]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    /// Plain text until [`User::hash_password`] runs, a bcrypt hash afterwards.
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<bson::DateTime>,
}

impl User {
    /// Creates a user with a fresh identifier, a trimmed name and a lower-cased email.
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: Uuid::new(),
            name: name.into().trim().to_string(),
            email: normalize_email(&email.into()),
            password: password.into(),
            role: Role::User,
            is_email_verified: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Runs the field rules. Password rules are skipped once the password is hashed.
    pub fn check(&self) -> DocumentStoreResult<()> {
        self.validate()
            .map_err(|errors| DocumentStoreError::Validation(errors.to_string()))
    }

    /// Replaces the plain password with its bcrypt hash. A password that is already a
    /// bcrypt hash is left alone.
    pub fn hash_password(&mut self) -> DocumentStoreResult<()> {
        self.hash_password_with_cost(DEFAULT_COST)
    }

    pub fn hash_password_with_cost(&mut self, cost: u32) -> DocumentStoreResult<()> {
        if is_bcrypt_hash(&self.password) {
            return Ok(());
        }

        self.password = hash(&self.password, cost)
            .map_err(|e| DocumentStoreError::Unknown(format!("Failed to hash password: {e}")))?;

        Ok(())
    }

    /// Checks a plain-text candidate against the stored hash.
    pub fn is_password_match(&self, candidate: &str) -> DocumentStoreResult<bool> {
        verify(candidate, &self.password)
            .map_err(|e| DocumentStoreError::Unknown(format!("Failed to verify password: {e}")))
    }
}

impl Document for User {
    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "users"
    }

    fn schema() -> Schema {
        Schema::builder(Self::collection_name())
            .private("password")
            .timestamps(true)
            .build()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_bcrypt_hash(value: &str) -> bool {
    value.len() == 60 && ["$2a$", "$2b$", "$2x$", "$2y$"].iter().any(|prefix| value.starts_with(prefix))
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("name_empty"));
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if is_bcrypt_hash(password) {
        return Ok(());
    }

    if password.chars().count() < 8 {
        return Err(ValidationError::new("password_too_short"));
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err(ValidationError::new("password_needs_letter_and_number"));
    }

    Ok(())
}

fn validate_password_excludes_name(user: &User) -> Result<(), ValidationError> {
    if is_bcrypt_hash(&user.password) {
        return Ok(());
    }

    let name = user.name.trim().to_lowercase();

    if !name.is_empty() && user.password.to_lowercase().contains(&name) {
        return Err(ValidationError::new("password_contains_name"));
    }

    Ok(())
}

/// Account operations over the `users` collection.
#[derive(Debug)]
pub struct UserRepository<'a, B: StoreBackend> {
    users: TypedCollection<'a, B, User>,
    hash_cost: u32,
}

impl<'a, B: StoreBackend> UserRepository<'a, B> {
    pub fn new(store: &'a DocumentStore<B>) -> Self {
        Self {
            users: store.typed_collection::<User>(),
            hash_cost: DEFAULT_COST,
        }
    }

    /// Sets the bcrypt cost used when storing passwords.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Validates, hashes and stores a new user.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Validation`] when a field rule fails or the email is taken.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn create(&self, mut user: User) -> DocumentStoreResult<User> {
        user.name = user.name.trim().to_string();
        user.email = normalize_email(&user.email);
        user.check()?;

        if self.is_email_taken(&user.email, None).await? {
            return Err(DocumentStoreError::Validation("Email already taken".to_string()));
        }

        user.hash_password_with_cost(self.hash_cost)?;

        let user = self.users.insert_one(user).await?;
        info!("user created");

        Ok(user)
    }

    /// Returns whether another user already uses `email`.
    pub async fn is_email_taken(&self, email: &str, exclude_id: Option<Uuid>) -> DocumentStoreResult<bool> {
        let mut filter = Filter::eq("email", normalize_email(email));

        if let Some(id) = exclude_id {
            filter = filter.and(Filter::ne(ID_FIELD, id));
        }

        Ok(self.users.count(Some(filter)).await? > 0)
    }

    pub async fn get_by_id(&self, id: Uuid) -> DocumentStoreResult<Option<User>> {
        self.users.get_one(id).await
    }

    pub async fn get_by_email(&self, email: &str) -> DocumentStoreResult<Option<User>> {
        self.users
            .find_one(Filter::eq("email", normalize_email(email)))
            .await
    }

    /// Stores changes to an existing user, re-hashing a changed password.
    pub async fn update(&self, mut user: User) -> DocumentStoreResult<User> {
        user.name = user.name.trim().to_string();
        user.email = normalize_email(&user.email);
        user.check()?;

        if self.is_email_taken(&user.email, Some(user.id)).await? {
            return Err(DocumentStoreError::Validation("Email already taken".to_string()));
        }

        user.hash_password_with_cost(self.hash_cost)?;

        debug!(user_id = %user.id, "updating user");
        self.users.update(user).await
    }

    pub async fn delete(&self, id: Uuid) -> DocumentStoreResult<()> {
        self.users.delete(vec![id]).await
    }

    /// Pages users in their public form: no password, `id` instead of `_id`.
    pub async fn paginate(&self, filter: Option<Expr>, options: &PageOptions) -> DocumentStoreResult<PageResult<Value>> {
        self.users.paginate_public(filter, options).await
    }

    /// The public form of a single user.
    pub fn to_public(&self, user: &User) -> DocumentStoreResult<Value> {
        self.users.to_public(user)
    }

    /// Filter matching users with the given role.
    pub fn role_filter(role: Role) -> Expr {
        let role = match role {
            Role::User => "user",
            Role::Admin => "admin",
        };

        Filter::eq("role", role)
    }
}

#[cfg(test)]
mod tests {
    use fake::{Fake, faker::internet::en::SafeEmail, faker::name::en::Name};

    use super::*;

    fn new_user() -> User {
        let name: String = Name().fake();
        let email: String = SafeEmail().fake();

        User::new(name, email, "password1")
    }

    #[test]
    fn valid_user_passes() {
        assert!(new_user().check().is_ok());
    }

    #[test]
    fn invalid_email_fails() {
        let mut user = new_user();
        user.email = "invalidEmail".to_string();

        assert!(matches!(user.check(), Err(DocumentStoreError::Validation(_))));
    }

    #[test]
    fn short_password_fails() {
        let mut user = new_user();
        user.password = "passwo1".to_string();

        assert!(user.check().is_err());
    }

    #[test]
    fn password_needs_letters_and_numbers() {
        let mut user = new_user();

        user.password = "password".to_string();
        assert!(user.check().is_err());

        user.password = "11111111".to_string();
        assert!(user.check().is_err());
    }

    #[test]
    fn empty_name_fails() {
        let mut user = new_user();
        user.name = "   ".to_string();

        assert!(user.check().is_err());
    }

    #[test]
    fn password_must_not_contain_name() {
        let mut user = new_user();
        user.name = "John".to_string();
        user.password = "passwordJohn1".to_string();

        assert!(user.check().is_err());
    }

    #[test]
    fn hashed_users_still_validate_other_fields() {
        let mut user = new_user();
        user.hash_password_with_cost(4).unwrap();
        assert!(user.check().is_ok());

        user.email = "invalidEmail".to_string();
        assert!(user.check().is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(serde_json::from_value::<Role>(serde_json::json!("invalid")).is_err());
        assert_eq!(serde_json::from_value::<Role>(serde_json::json!("admin")).unwrap(), Role::Admin);
    }

    #[test]
    fn constructor_normalizes_name_and_email() {
        let user = User::new("  Ann  ", "Ann@Example.COM ", "password1");

        assert_eq!(user.name, "Ann");
        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.role, Role::User);
        assert!(!user.is_email_verified);
    }

    #[test]
    fn hashing_replaces_password_and_is_not_repeated() {
        let mut user = new_user();
        user.hash_password_with_cost(4).unwrap();

        assert_ne!(user.password, "password1");
        assert!(user.is_password_match("password1").unwrap());
        assert!(!user.is_password_match("password2").unwrap());

        let hashed = user.password.clone();
        user.hash_password_with_cost(4).unwrap();
        assert_eq!(user.password, hashed);
    }

    #[test]
    fn public_form_hides_password() {
        let user = new_user();
        let public = docshape_core::document::DocumentExt::to_public(&user).unwrap();

        assert!(public.get("password").is_none());
        assert!(public.get("_id").is_none());
        assert_eq!(public["id"], serde_json::json!(user.id.to_string()));
        assert_eq!(public["role"], serde_json::json!("user"));
    }
}
