use std::fmt;

/// Operation requested by a frame.
///
/// `RegisterClient` and `RegisterSs` are legacy aliases of `ClientInit` and
/// `SsInit` and are handled identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    View = 1,
    Read = 2,
    Create = 3,
    Write = 4,
    Etirw = 5,
    Undo = 6,
    Info = 7,
    Delete = 8,
    Stream = 9,
    List = 10,
    AddAccess = 11,
    RemAccess = 12,
    UpdateAcl = 13,
    GetAcl = 14,
    Exec = 15,
    RegisterClient = 16,
    RegisterSs = 17,
    SsInit = 18,
    ClientInit = 19,
    Heartbeat = 20,
}

impl Command {
    const ALL: [Command; 20] = [
        Command::View,
        Command::Read,
        Command::Create,
        Command::Write,
        Command::Etirw,
        Command::Undo,
        Command::Info,
        Command::Delete,
        Command::Stream,
        Command::List,
        Command::AddAccess,
        Command::RemAccess,
        Command::UpdateAcl,
        Command::GetAcl,
        Command::Exec,
        Command::RegisterClient,
        Command::RegisterSs,
        Command::SsInit,
        Command::ClientInit,
        Command::Heartbeat,
    ];

    pub fn from_u32(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u32 == code)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::View => "VIEW",
            Command::Read => "READ",
            Command::Create => "CREATE",
            Command::Write => "WRITE",
            Command::Etirw => "ETIRW",
            Command::Undo => "UNDO",
            Command::Info => "INFO",
            Command::Delete => "DELETE",
            Command::Stream => "STREAM",
            Command::List => "LIST",
            Command::AddAccess => "ADDACCESS",
            Command::RemAccess => "REMACCESS",
            Command::UpdateAcl => "UPDATE_ACL",
            Command::GetAcl => "GET_ACL",
            Command::Exec => "EXEC",
            Command::RegisterClient => "REGISTER_CLIENT",
            Command::RegisterSs => "REGISTER_SS",
            Command::SsInit => "SS_INIT",
            Command::ClientInit => "CLIENT_INIT",
            Command::Heartbeat => "HEARTBEAT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome carried by every response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    NotFound = 1001,
    Unauthorized = 1002,
    Locked = 1003,
    InvalidArgs = 1004,
    ServerUnavailable = 1005,
    FileExists = 1006,
    InvalidFilename = 1007,
    InvalidUsername = 1008,
    SentenceOutOfRange = 1009,
    WordOutOfRange = 1010,
    WritePermission = 1011,
    ReadPermission = 1012,
    OwnerRequired = 1013,
    Network = 1014,
    StorageFull = 1015,
    InvalidOperation = 1016,
    ConcurrentWrite = 1017,
    InvalidFormat = 1018,
    Timeout = 1019,
    Internal = 1020,
    UserNotFound = 1021,
    AlreadyConnected = 1022,
    NotConnected = 1023,
    UndoNotAvailable = 1024,
    ExecutionFailed = 1025,
}

impl Status {
    pub fn from_u32(code: u32) -> Option<Self> {
        use Status::*;
        let status = match code {
            0 => Ok,
            1001 => NotFound,
            1002 => Unauthorized,
            1003 => Locked,
            1004 => InvalidArgs,
            1005 => ServerUnavailable,
            1006 => FileExists,
            1007 => InvalidFilename,
            1008 => InvalidUsername,
            1009 => SentenceOutOfRange,
            1010 => WordOutOfRange,
            1011 => WritePermission,
            1012 => ReadPermission,
            1013 => OwnerRequired,
            1014 => Network,
            1015 => StorageFull,
            1016 => InvalidOperation,
            1017 => ConcurrentWrite,
            1018 => InvalidFormat,
            1019 => Timeout,
            1020 => Internal,
            1021 => UserNotFound,
            1022 => AlreadyConnected,
            1023 => NotConnected,
            1024 => UndoNotAvailable,
            1025 => ExecutionFailed,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Default human-readable text sent when a handler has nothing more
    /// specific to say.
    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "Success",
            Status::NotFound => "File not found",
            Status::Unauthorized => "Access denied",
            Status::Locked => "File is locked",
            Status::InvalidArgs => "Invalid arguments",
            Status::ServerUnavailable => "Server unavailable",
            Status::FileExists => "File already exists",
            Status::InvalidFilename => "Invalid filename",
            Status::InvalidUsername => "Invalid username",
            Status::SentenceOutOfRange => "Sentence index out of range",
            Status::WordOutOfRange => "Word index out of range",
            Status::WritePermission => "Write permission required",
            Status::ReadPermission => "Read permission required",
            Status::OwnerRequired => "Owner access required",
            Status::Network => "Network error",
            Status::StorageFull => "Storage full",
            Status::InvalidOperation => "Invalid operation",
            Status::ConcurrentWrite => "Concurrent write detected",
            Status::InvalidFormat => "Invalid format",
            Status::Timeout => "Operation timed out",
            Status::Internal => "Internal server error",
            Status::UserNotFound => "User not found",
            Status::AlreadyConnected => "Already connected",
            Status::NotConnected => "Not connected",
            Status::UndoNotAvailable => "Undo not available",
            Status::ExecutionFailed => "Command execution failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_u32(cmd.code()), Some(cmd));
        }
        assert_eq!(Command::SsInit.code(), 18);
        assert_eq!(Command::Heartbeat.code(), 20);
        assert_eq!(Command::from_u32(0), None);
        assert_eq!(Command::from_u32(21), None);
    }

    #[test]
    fn status_codes_are_contiguous() {
        assert_eq!(Status::from_u32(0), Some(Status::Ok));
        for code in 1001..=1025 {
            let status = Status::from_u32(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(Status::from_u32(1026), None);
    }
}
