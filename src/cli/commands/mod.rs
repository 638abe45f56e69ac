mod init;
mod key;
mod login;
mod support;
mod user;

pub use init::cmd_init;
pub use key::{cmd_key_issue, cmd_key_list, cmd_key_revoke};
pub use login::{cmd_login, cmd_whoami};
pub use user::{
    cmd_user_add, cmd_user_delete, cmd_user_list, cmd_user_passwd, cmd_user_set_active,
    cmd_user_set_admin, cmd_user_show, cmd_user_unlock,
};
