use crate::error::app_error::ErrorBody;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::new("اطلاعات ارسالی نامعتبر است."))
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::new("Not found"))
}

#[catch(413)]
pub fn payload_too_large(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::new("اطلاعات ارسالی بیش از حد مجاز است."))
}

#[catch(429)]
pub fn too_many_requests(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::new("تعداد درخواست‌ها بیش از حد مجاز است. لطفاً کمی بعد دوباره تلاش کنید."))
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::new("خطای داخلی سرور"))
}
