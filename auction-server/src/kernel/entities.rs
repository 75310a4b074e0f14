pub type UserId = i64;
pub type AccessToken = String;
