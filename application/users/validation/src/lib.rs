use std::sync::LazyLock;

use regex::Regex;
use user_commands::{
    AddUsersCommand, CreateUserCommand, DeleteUserCommand, UpdateUserCommand,
};
use user_errors::UserError;
use user_models::{PageRequest, Role, SortField, SortingOrder};
use user_queries::ListUsersQuery;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*\.\w{2,4}$")
        .expect("Invalid email regex")
});
static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9 _-]{2,30}$")
        .expect("Invalid name regex")
});
static PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]{6,15}$")
        .expect("Invalid password regex")
});

/// User fields that passed validation. The password is still plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: String,
}

pub fn validate_email(email: &str) -> Result<(), UserError> {
    if EMAIL.is_match(email) {
        Ok(())
    }
    else {
        Err(UserError::InvalidArgument(format!("bad email {email}")))
    }
}

pub fn validate_name(name: &str) -> Result<(), UserError> {
    if NAME.is_match(name) {
        Ok(())
    }
    else {
        Err(UserError::InvalidArgument(format!(
            "bad name {name} (should contain <a-zA-Z0-9 -_> length 2-30 \
             symbols)"
        )))
    }
}

/// The rejected value is not echoed back.
pub fn validate_password(password: &str) -> Result<(), UserError> {
    if PASSWORD.is_match(password) {
        Ok(())
    }
    else {
        Err(UserError::InvalidArgument(
            "bad password (should contain <a-zA-Z0-9> length 6-15 symbols)"
                .to_string(),
        ))
    }
}

pub fn parse_role(role: &str) -> Result<Role, UserError> {
    Ok(role.parse::<Role>()?)
}

pub fn parse_sort_field(field: &str) -> Result<SortField, UserError> {
    Ok(field.parse::<SortField>()?)
}

fn validate_fields(
    email: &str, name: &str, role: &str, password: &str,
) -> Result<ValidUser, UserError> {
    validate_email(email)?;
    validate_name(name)?;
    let role = parse_role(role)?;
    validate_password(password)?;

    Ok(ValidUser {
        email: email.to_string(),
        name: name.to_string(),
        role,
        password: password.to_string(),
    })
}

pub fn validate_create(cmd: &CreateUserCommand) -> Result<ValidUser, UserError> {
    validate_fields(&cmd.email, &cmd.name, &cmd.role, &cmd.password)
}

pub fn validate_update(cmd: &UpdateUserCommand) -> Result<ValidUser, UserError> {
    let user = validate_fields(&cmd.email, &cmd.name, &cmd.role, &cmd.password)?;
    validate_password(&cmd.old_password)?;
    Ok(user)
}

pub fn validate_delete(cmd: &DeleteUserCommand) -> Result<(), UserError> {
    validate_password(&cmd.password)
}

/// Validates every entry before any of them is created.
pub fn validate_add_users(
    cmd: &AddUsersCommand,
) -> Result<Vec<ValidUser>, UserError> {
    if cmd.users.is_empty() {
        return Err(UserError::InvalidArgument("data is empty".to_string()));
    }
    cmd.users.iter().map(validate_create).collect()
}

/// Builds a list query, applying defaults for anything omitted.
pub fn list_query(
    page_size: Option<u64>, page_num: Option<u64>, sort_field: Option<&str>,
    descending: Option<bool>,
) -> Result<ListUsersQuery, UserError> {
    let field = match sort_field {
        Some(field) if !field.is_empty() => parse_sort_field(field)?,
        _ => SortField::default(),
    };

    let page = PageRequest::new(page_size, page_num);
    if page.checked_offset().is_none() {
        return Err(UserError::InvalidArgument(format!(
            "bad page {} of size {}",
            page.page_num, page.page_size
        )));
    }

    Ok(ListUsersQuery {
        page,
        order: SortingOrder {
            field,
            descending: descending.unwrap_or(false),
        },
    })
}
