/// The authenticated caller, as extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub permission_level: i64,
}

impl Identity {
    pub fn owns(&self, author: &str) -> bool {
        self.id == author
    }
}
