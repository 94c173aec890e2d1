/// The signed-in user as decoded by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub is_admin: bool,
}
