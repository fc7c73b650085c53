use crate::{Error, STUB_UUID};

use uuid::Uuid;

/// Cost used for the password hash stored at account creation
pub const BCRYPT_PASSWORD_COST: u32 = 10;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Lecturer,
    Admin,
}

impl Role {
    /// Whether this role may publish videos and ebooks
    pub fn can_publish(&self) -> bool {
        match self {
            Role::Student => false,
            Role::Lecturer | Role::Admin => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "lecturer" => Some(Role::Lecturer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Role, Error> {
        Role::parse(s).ok_or_else(|| Error::InvalidName(String::from(s)))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub initial_password_hash: String,
}

impl NewUser {
    pub fn new(
        id: UserId,
        display_name: String,
        email: String,
        role: Role,
        initial_password: String,
    ) -> NewUser {
        NewUser {
            id,
            display_name,
            email,
            role,
            initial_password_hash: bcrypt::hash(initial_password, BCRYPT_PASSWORD_COST)
                .expect("failed hashing password"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.display_name)?;
        crate::validate_string(&self.email)?;
        crate::validate_string(&self.initial_password_hash)?;
        validate_display_name(&self.display_name)?;
        if !is_valid_email(&self.email) {
            return Err(Error::InvalidName(self.email.clone()));
        }
        Ok(())
    }

    pub fn user(&self) -> User {
        User {
            id: self.id,
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Changes a user can make to their own account
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProfileUpdate {
    /// Only affects what gets written from now on. Comments keep the name
    /// their author had when posting them.
    pub display_name: String,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_display_name(&self.display_name)
    }
}

fn validate_display_name(name: &str) -> Result<(), Error> {
    crate::validate_string(name)?;
    if name.trim().is_empty() || name.chars().any(char::is_control) {
        return Err(Error::InvalidName(String::from(name)));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(|c| c.is_whitespace() || c.is_control())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(display_name: &str, email: &str) -> NewUser {
        NewUser {
            id: UserId::stub(),
            display_name: String::from(display_name),
            email: String::from(email),
            role: Role::Student,
            initial_password_hash: String::from("hash"),
        }
    }

    #[test]
    fn user_validation() {
        assert_eq!(new_user("Bob", "bob@uni.edu").validate(), Ok(()));
        assert_eq!(
            new_user("  ", "bob@uni.edu").validate(),
            Err(Error::InvalidName(String::from("  ")))
        );
        assert_eq!(
            new_user("Bob", "bob.uni.edu").validate(),
            Err(Error::InvalidName(String::from("bob.uni.edu")))
        );
        assert_eq!(
            new_user("Bob", "bob @uni.edu").validate(),
            Err(Error::InvalidName(String::from("bob @uni.edu")))
        );
    }

    #[test]
    fn profile_update_validation() {
        let update = |name: &str| ProfileUpdate {
            display_name: String::from(name),
        };
        assert_eq!(update("Dr. Bob").validate(), Ok(()));
        assert_eq!(
            update("").validate(),
            Err(Error::InvalidName(String::from("")))
        );
        assert_eq!(
            update("Bob\nthe builder").validate(),
            Err(Error::InvalidName(String::from("Bob\nthe builder")))
        );
        assert_eq!(
            update("a\0b").validate(),
            Err(Error::NullByteInString(String::from("a\0b")))
        );
    }

    #[test]
    fn publishing_roles() {
        assert!(!Role::Student.can_publish());
        assert!(Role::Lecturer.can_publish());
        assert!(Role::Admin.can_publish());
        for r in [Role::Student, Role::Lecturer, Role::Admin] {
            assert_eq!(Role::parse(r.as_str()), Some(r));
        }
    }
}
