//! Caller identity

use shared::ApiResponse;
use shared::error::AppResult;
use shared::models::User;

use crate::auth::CurrentUser;

/// GET /auth/me
pub async fn me(CurrentUser(user): CurrentUser) -> AppResult<ApiResponse<User>> {
    Ok(ApiResponse::success(user))
}
