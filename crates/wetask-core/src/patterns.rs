//! RPC patterns.
//!
//! Each pattern is a logical operation name, realized as a durable broker
//! queue consumed by exactly one service.

// Auth patterns
pub const AUTH_REGISTER: &str = "auth.register";
pub const AUTH_LOGIN: &str = "auth.login";
pub const AUTH_REFRESH: &str = "auth.refresh";
pub const AUTH_VALIDATE: &str = "auth.validate";

// Users patterns
pub const USERS_GET_BY_ID: &str = "users.getById";
pub const USERS_GET_BY_EMAIL: &str = "users.getByEmail";
pub const USERS_UPDATE: &str = "users.update";
pub const USERS_GET_ME: &str = "users.getMe";

// Teams patterns
pub const TEAMS_CREATE: &str = "teams.create";
pub const TEAMS_GET_ALL: &str = "teams.getAll";
pub const TEAMS_GET_BY_ID: &str = "teams.getById";
pub const TEAMS_ADD_MEMBER: &str = "teams.addMember";
pub const TEAMS_REMOVE_MEMBER: &str = "teams.removeMember";
pub const TEAMS_GET_USER_TEAMS: &str = "teams.getUserTeams";

// Boards patterns
pub const BOARDS_CREATE: &str = "boards.create";
pub const BOARDS_GET_ALL: &str = "boards.getAll";
pub const BOARDS_GET_BY_ID: &str = "boards.getById";
pub const BOARDS_UPDATE: &str = "boards.update";
pub const BOARDS_DELETE: &str = "boards.delete";
pub const BOARDS_GET_BY_TEAM: &str = "boards.getByTeam";

// Columns patterns
pub const COLUMNS_CREATE: &str = "columns.create";
pub const COLUMNS_GET_BY_BOARD: &str = "columns.getByBoard";
pub const COLUMNS_UPDATE: &str = "columns.update";
pub const COLUMNS_DELETE: &str = "columns.delete";

// Tasks patterns
pub const TASKS_CREATE: &str = "tasks.create";
pub const TASKS_GET_BY_ID: &str = "tasks.getById";
pub const TASKS_GET_BY_BOARD: &str = "tasks.getByBoard";
pub const TASKS_UPDATE: &str = "tasks.update";
pub const TASKS_DELETE: &str = "tasks.delete";
pub const TASKS_MOVE: &str = "tasks.move";
pub const TASKS_ADD_COMMENT: &str = "tasks.addComment";
pub const TASKS_GET_COMMENTS: &str = "tasks.getComments";
