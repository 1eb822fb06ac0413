#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Hrd = 2,
    Employee = 3,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hrd),
            3 => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Hrd => "hrd",
            Role::Employee => "employee",
        }
    }

    /// Create, update and delete user accounts.
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Inspect the user directory.
    pub fn can_view_users(&self) -> bool {
        matches!(self, Role::Admin | Role::Hrd)
    }

    /// Approve or reject leave requests, and see every employee's leaves.
    pub fn can_process_leave(&self) -> bool {
        matches!(self, Role::Admin | Role::Hrd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip() {
        for role in [Role::Admin, Role::Hrd, Role::Employee] {
            assert_eq!(Role::from_id(role as u8), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(9), None);
    }

    #[test]
    fn capabilities_follow_role() {
        assert!(Role::Admin.can_manage_users());
        assert!(!Role::Hrd.can_manage_users());
        assert!(Role::Hrd.can_process_leave());
        assert!(!Role::Employee.can_process_leave());
        assert!(!Role::Employee.can_view_users());
    }
}
