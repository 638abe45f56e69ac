pub mod tokens {

    /// Random bytes behind every API key and session token (256 bits).
    pub const TOKEN_BYTES: usize = 32;

    /// Length of a token once encoded as unpadded URL-safe base64.
    pub const ENCODED_TOKEN_LEN: usize = 43;
}

pub mod limits {

    pub const USERNAME_MIN_LEN: usize = 3;

    pub const USERNAME_MAX_LEN: usize = 80;

    pub const EMAIL_MAX_LEN: usize = 120;

    pub const KEY_LABEL_MAX_LEN: usize = 100;

    pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";
}

pub mod bootstrap {

    pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

    pub const DEFAULT_ADMIN_PASSWORD: &str = "changeme123";
}
