//! Closed enumerations defined by the host: error codes, iterator types,
//! log levels and cooperative I/O events.

use strum::{FromRepr, IntoStaticStr};

/// Host error codes, in host numbering.
///
/// The set is closed on the host side; [`ErrorCode::from_raw`] keeps codes
/// from newer hosts representable as [`RawErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u32)]
#[allow(missing_docs, reason = "variant names mirror the host's ER_* constants")]
pub enum ErrorCode {
	Unknown = 0,
	IllegalParams = 1,
	MemoryIssue = 2,
	TupleFound = 3,
	TupleNotFound = 4,
	Unsupported = 5,
	Nonmaster = 6,
	Readonly = 7,
	Injection = 8,
	CreateSpace = 9,
	SpaceExists = 10,
	DropSpace = 11,
	AlterSpace = 12,
	IndexType = 13,
	ModifyIndex = 14,
	LastDrop = 15,
	TupleFormatLimit = 16,
	DropPrimaryKey = 17,
	KeyPartType = 18,
	ExactMatch = 19,
	InvalidMsgpack = 20,
	ProcRet = 21,
	TupleNotArray = 22,
	FieldType = 23,
	FieldTypeMismatch = 24,
	Splice = 25,
	UpdateArgType = 26,
	TupleIsTooLong = 27,
	UnknownUpdateOp = 28,
	UpdateField = 29,
	FiberStack = 30,
	KeyPartCount = 31,
	ProcLua = 32,
	NoSuchProc = 33,
	NoSuchTrigger = 34,
	NoSuchIndex = 35,
	NoSuchSpace = 36,
	NoSuchField = 37,
	ExactFieldCount = 38,
	IndexFieldCount = 39,
	WalIo = 40,
	MoreThanOneTuple = 41,
	AccessDenied = 42,
	CreateUser = 43,
	DropUser = 44,
	NoSuchUser = 45,
	UserExists = 46,
	PasswordMismatch = 47,
	UnknownRequestType = 48,
	UnknownSchemaObject = 49,
	CreateFunction = 50,
	NoSuchFunction = 51,
	FunctionExists = 52,
	FunctionAccessDenied = 53,
	FunctionMax = 54,
	SpaceAccessDenied = 55,
	UserMax = 56,
	NoSuchEngine = 57,
	ReloadCfg = 58,
	Cfg = 59,
	Vinyl = 60,
	LocalServerIsNotActive = 61,
	UnknownServer = 62,
	ClusterIdMismatch = 63,
	InvalidUuid = 64,
	ClusterIdIsRo = 65,
	ServerIdMismatch = 66,
	ServerIdIsReserved = 67,
	InvalidOrder = 68,
	MissingRequestField = 69,
	Identifier = 70,
	DropFunction = 71,
	IteratorType = 72,
	ReplicaMax = 73,
	InvalidXlog = 74,
	InvalidXlogName = 75,
	InvalidXlogOrder = 76,
	NoConnection = 77,
	Timeout = 78,
	ActiveTransaction = 79,
	NoActiveTransaction = 80,
	CrossEngineTransaction = 81,
	NoSuchRole = 82,
	RoleExists = 83,
	CreateRole = 84,
	IndexExists = 85,
	TupleRefOverflow = 86,
	RoleLoop = 87,
	Grant = 88,
	PrivGranted = 89,
	RoleGranted = 90,
	PrivNotGranted = 91,
	RoleNotGranted = 92,
	MissingSnapshot = 93,
	CantUpdatePrimaryKey = 94,
	UpdateIntegerOverflow = 95,
	GuestUserPassword = 96,
	TransactionConflict = 97,
	UnsupportedRolePriv = 98,
	LoadFunction = 99,
	FunctionLanguage = 100,
	RtreeRect = 101,
	ProcC = 102,
	UnknownRtreeIndexDistanceType = 103,
	Protocol = 104,
	UpsertUniqueSecondaryKey = 105,
	WrongIndexRecord = 106,
	WrongIndexParts = 107,
	WrongIndexOptions = 108,
	WrongSchemaVersion = 109,
	SlabAllocMax = 110,
	WrongSpaceOptions = 111,
	UnsupportedIndexFeature = 112,
	ViewIsRo = 113,
	ServerUuidMismatch = 114,
	System = 115,
	Loading = 116,
	ConnectionToSelf = 117,
	KeyPartIsTooLong = 118,
	Compression = 119,
	SnapshotInProgress = 120,
	SubStmtMax = 121,
	CommitInSubStmt = 122,
	RollbackInSubStmt = 123,
	Decompression = 124,
	InvalidXlogType = 125,
	InvalidRunId = 126,
	AlreadyRunning = 127,
}

/// An error code as reported by the host, known or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawErrorCode {
	/// A code this crate knows by name.
	Known(ErrorCode),
	/// A code outside the known enumeration.
	Other(u32),
}

impl ErrorCode {
	/// Classifies a raw host error code.
	pub fn from_raw(code: u32) -> RawErrorCode {
		match Self::from_repr(code) {
			Some(known) => RawErrorCode::Known(known),
			None => RawErrorCode::Other(code),
		}
	}

	/// Host constant name without the `ER_` prefix, e.g. `"TupleFound"`.
	pub fn name(self) -> &'static str {
		self.into()
	}
}

impl RawErrorCode {
	/// Numeric value in host numbering.
	pub fn value(self) -> u32 {
		match self {
			RawErrorCode::Known(code) => code as u32,
			RawErrorCode::Other(code) => code,
		}
	}

	/// Returns true when this is `code`.
	pub fn is(self, code: ErrorCode) -> bool {
		self == RawErrorCode::Known(code)
	}
}

/// Comparison semantics of an index scan.
///
/// Each index kind supports a subset; the host rejects the others with
/// [`ErrorCode::Unsupported`]. An empty key means the first key for
/// ascending scans (`Ge`, `Gt`, `All`) and the last key for descending ones
/// (`Le`, `Lt`). `Eq` and `Req` need a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(i32)]
pub enum IteratorType {
	/// key == x, ascending
	Eq = 0,
	/// key == x, descending
	Req = 1,
	/// all tuples
	All = 2,
	/// key < x
	Lt = 3,
	/// key <= x
	Le = 4,
	/// key >= x
	Ge = 5,
	/// key > x
	Gt = 6,
	/// all bits from x are set in key
	BitsAllSet = 7,
	/// at least one bit of x is set in key
	BitsAnySet = 8,
	/// no bit of x is set in key
	BitsAllNotSet = 9,
	/// key overlaps x
	Overlaps = 10,
	/// tuples in ascending distance from a point
	Neighbor = 11,
}

impl IteratorType {
	/// Every iterator type, in host numbering.
	pub const ALL: [IteratorType; 12] = [
		Self::Eq,
		Self::Req,
		Self::All,
		Self::Lt,
		Self::Le,
		Self::Ge,
		Self::Gt,
		Self::BitsAllSet,
		Self::BitsAnySet,
		Self::BitsAllNotSet,
		Self::Overlaps,
		Self::Neighbor,
	];

	/// True for scans that need an explicit key.
	pub const fn requires_key(self) -> bool {
		matches!(self, Self::Eq | Self::Req)
	}

	/// True for scans that walk the index backwards.
	pub const fn is_reverse(self) -> bool {
		matches!(self, Self::Req | Self::Lt | Self::Le)
	}
}

/// Host log severities, in host numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum SayLevel {
	Fatal = 0,
	SysError = 1,
	Error = 2,
	Crit = 3,
	Warn = 4,
	Info = 5,
	Debug = 6,
}

/// `coio_wait` event: descriptor readable.
pub const COIO_READ: i32 = 0x1;
/// `coio_wait` event: descriptor writable.
pub const COIO_WRITE: i32 = 0x2;
