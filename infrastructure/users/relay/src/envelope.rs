use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use user_errors::UserError;
use user_models::{DEFAULT_PAGE_NUM, DEFAULT_PAGE_SIZE, SortField};
use user_queries::{GetUserQuery, ListUsersQuery};

pub const USER_LIST: &str = "UserList";
pub const USER_GET: &str = "UserGet";

/// Wire form of every relay message, requests and responses alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    #[serde(default)]
    pub request_data: Value,
}

impl Envelope {
    pub fn failure(command: impl Into<String>, err: &UserError) -> Self {
        Self {
            command: command.into(),
            request_data: Value::String(err.to_relay_text()),
        }
    }

    pub fn success<T: Serialize>(
        command: impl Into<String>, result: &T,
    ) -> Result<Self, UserError> {
        let request_data = serde_json::to_value(result).map_err(|e| {
            UserError::internal(format!("encoding relay result: {e}"))
        })?;
        Ok(Self {
            command: command.into(),
            request_data,
        })
    }

    pub fn encode(&self) -> Result<Bytes, UserError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| UserError::internal(format!("encoding envelope: {e}")))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, UserError> {
        serde_json::from_slice(payload).map_err(|e| {
            UserError::InvalidArgument(format!("malformed envelope: {e}"))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListRequest {
    #[serde(default)]
    pub rec_per_page: u64,
    #[serde(default)]
    pub page_num: u64,
    #[serde(default)]
    pub order: OrderRequest,
}

impl UserListRequest {
    /// Fills zero or empty fields with the paging and sort defaults.
    pub fn normalized(mut self) -> Self {
        if self.rec_per_page == 0 {
            self.rec_per_page = DEFAULT_PAGE_SIZE;
        }
        if self.page_num == 0 {
            self.page_num = DEFAULT_PAGE_NUM;
        }
        if self.order.field.is_empty() {
            self.order.field = SortField::default().to_string();
        }
        self
    }

    pub fn to_query(&self) -> Result<ListUsersQuery, UserError> {
        user_validation::list_query(
            Some(self.rec_per_page),
            Some(self.page_num),
            Some(&self.order.field),
            Some(self.order.descending),
        )
    }
}

impl From<ListUsersQuery> for UserListRequest {
    fn from(query: ListUsersQuery) -> Self {
        Self {
            rec_per_page: query.page.page_size,
            page_num: query.page.page_num,
            order: OrderRequest {
                field: query.order.field.to_string(),
                descending: query.order.descending,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGetRequest {
    pub id: i64,
}

impl From<UserGetRequest> for GetUserQuery {
    fn from(request: UserGetRequest) -> Self {
        GetUserQuery {
            user_id: request.id,
        }
    }
}

/// Commands the relay knows how to carry. Writes are not among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    UserList(UserListRequest),
    UserGet(UserGetRequest),
}

impl RelayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RelayCommand::UserList(_) => USER_LIST,
            RelayCommand::UserGet(_) => USER_GET,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, UserError> {
        match self {
            RelayCommand::UserList(request) => Envelope::success(USER_LIST, request),
            RelayCommand::UserGet(request) => Envelope::success(USER_GET, request),
        }
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, UserError> {
        let data = envelope.request_data.clone();
        match envelope.command.as_str() {
            USER_LIST => {
                // Missing request data is treated as "all defaults".
                let data = if data.is_null() { Value::Object(Default::default()) } else { data };
                serde_json::from_value(data)
                    .map(RelayCommand::UserList)
                    .map_err(|e| UserError::InvalidArgument(format!("malformed {USER_LIST} request: {e}")))
            }
            USER_GET => {
                serde_json::from_value(data)
                    .map(RelayCommand::UserGet)
                    .map_err(|e| UserError::InvalidArgument(format!("malformed {USER_GET} request: {e}")))
            }
            other => Err(UserError::internal(format!("unsupported command {other}"))),
        }
    }
}

/// A response envelope as seen by the waiting caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReply(pub Envelope);

impl RelayReply {
    /// A string in `request_data` is an error text; anything else is the
    /// result.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, UserError> {
        match self.0.request_data {
            Value::String(text) => Err(UserError::from_relay_text(&text)),
            data => serde_json::from_value(data).map_err(|e| {
                UserError::internal(format!("decoding relay reply: {e}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use user_models::UserView;

    use super::*;

    #[test]
    fn test_list_request_wire_shape() {
        let command = RelayCommand::UserList(UserListRequest {
            rec_per_page: 10,
            page_num: 2,
            order: OrderRequest {
                field: "email".into(),
                descending: true,
            },
        });
        let envelope = command.to_envelope().unwrap();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "command": "UserList",
                "request_data": {
                    "rec_per_page": 10,
                    "page_num": 2,
                    "order": {"field": "email", "descending": true}
                }
            })
        );
        assert_eq!(RelayCommand::from_envelope(&envelope).unwrap(), command);
    }

    #[test]
    fn test_list_defaults_fill_missing_fields() {
        let envelope: Envelope =
            serde_json::from_value(json!({"command": "UserList"})).unwrap();
        let RelayCommand::UserList(request) =
            RelayCommand::from_envelope(&envelope).unwrap()
        else {
            panic!("Expected UserList");
        };

        let request = request.normalized();
        assert_eq!(request.rec_per_page, 5);
        assert_eq!(request.page_num, 1);
        assert_eq!(request.order.field, "id");
        assert_eq!(request.to_query().unwrap(), ListUsersQuery::default());
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let envelope = Envelope {
            command: "UserCreate".into(),
            request_data: json!({}),
        };
        let err = RelayCommand::from_envelope(&envelope).unwrap_err();
        assert_eq!(err.to_relay_text(), "unsupported command UserCreate");
    }

    #[test]
    fn test_reply_error_text_becomes_error() {
        let reply = RelayReply(Envelope::failure(
            USER_LIST,
            &UserError::InvalidArgument("bad sorting field bogus".into()),
        ));
        match reply.into_result::<Vec<UserView>>() {
            Err(UserError::InvalidArgument(msg)) => {
                assert_eq!(msg, "bad sorting field bogus")
            }
            other => panic!("Expected InvalidArgument, got {other:?}"),
        }

        let reply = RelayReply(Envelope {
            command: USER_GET.into(),
            request_data: json!({"id": 3, "email": "a@b.com", "name": "A", "role": "User"}),
        });
        let user: UserView = reply.into_result().unwrap();
        assert_eq!(user.id, 3);
    }
}
