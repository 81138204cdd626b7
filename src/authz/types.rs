use std::fmt;

/// Operation a caller asks the guard about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateReport,
    ReadOwnReports,
    ReadOwnReport,
    PublicSearch,
    ListAllReports,
    ReadAnyReport,
    UpdateStatus,
    ReadProfile,
    UpdateProfile,
    RegisterOfficer,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateReport => "report:create",
            Action::ReadOwnReports => "report:list_own",
            Action::ReadOwnReport => "report:read_own",
            Action::PublicSearch => "report:search",
            Action::ListAllReports => "report:list_all",
            Action::ReadAnyReport => "report:read_any",
            Action::UpdateStatus => "report:update_status",
            Action::ReadProfile => "user:read_profile",
            Action::UpdateProfile => "user:update_profile",
            Action::RegisterOfficer => "user:register_officer",
        }
    }

    /// Actions restricted to the police role regardless of the resource.
    pub fn is_police_only(&self) -> bool {
        matches!(
            self,
            Action::ListAllReports
                | Action::ReadAnyReport
                | Action::UpdateStatus
                | Action::RegisterOfficer
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the action targets. Only ownership matters to the guard, so report
/// resources carry nothing but the owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    None,
    /// The collection of reports filed by this user.
    OwnedBy(&'a str),
    Report { owner: &'a str },
    User(&'a str),
}

impl Resource<'_> {
    /// User id that owns the resource, if any.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Resource::None => None,
            Resource::OwnedBy(owner) | Resource::Report { owner } | Resource::User(owner) => {
                Some(owner)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthorized,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}
