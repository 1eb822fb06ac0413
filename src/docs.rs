use crate::api::leave_request::{LeaveFilter, LeaveListResponse, LeaveResponse};
use crate::api::users::{CreateUser, UserResponse};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::models::LoginReqDto;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Presensi API",
        version = "1.0.0",
        description = r#"
## Employee Time-Tracking & Leave-Management Backend

### Key Features
- **Attendance**
  - One check-in and one check-out per calendar day, with photo evidence
  - Duplicate and out-of-order submissions answered explicitly, never applied twice
  - Per-employee attendance history
- **Leave Management**
  - Submit leave requests, HR/Admin approval workflow
- **User Administration**
  - Admin-managed accounts, employee-number login

### Security
Endpoints are protected with **JWT Bearer authentication** (access + rotating
refresh tokens). Administrative operations require the admin or HR role.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::profile,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::history,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::create_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,
    ),
    components(
        schemas(
            LoginReqDto,
            AttendanceRecord,
            AttendanceStatus,
            LeaveFilter,
            LeaveResponse,
            LeaveListResponse,
            CreateUser,
            UserResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Authentication APIs"),
        (name = "Attendance", description = "Attendance management APIs"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Users", description = "User administration APIs"),
    )
)]
pub struct ApiDoc;
