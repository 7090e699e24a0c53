//! MD5 password authentication.

use rand::Rng;

use crate::net::messages::{Authentication, Password};

use super::Error;

/// MD5 challenge for one user.
#[derive(Debug, Clone)]
pub struct Client<'a> {
    user: &'a str,
    password: &'a str,
    salt: [u8; 4],
}

impl<'a> Client<'a> {
    /// Challenge with a random salt, used when authenticating clients.
    pub fn new(user: &'a str, password: &'a str) -> Self {
        Self {
            user,
            password,
            salt: rand::rng().random(),
        }
    }

    /// Answer a challenge sent by a server.
    pub fn new_salt(user: &'a str, password: &'a str, salt: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            user,
            password,
            salt: salt.try_into()?,
        })
    }

    /// `md5` followed by `md5(md5(password + user) + salt)` in hex.
    pub fn encrypted(&self) -> String {
        let inner = format!(
            "{:x}",
            md5::compute(format!("{}{}", self.password, self.user))
        );
        let mut outer = inner.into_bytes();
        outer.extend_from_slice(&self.salt);

        format!("md5{:x}", md5::compute(outer))
    }

    /// Password message answering the challenge.
    pub fn response(&self) -> Password {
        Password::new_password(self.encrypted())
    }

    /// Challenge to send to the client.
    pub fn challenge(&self) -> Authentication {
        Authentication::md5(self.salt)
    }

    /// Check the password hash the client sent back.
    pub fn check(&self, response: &str) -> bool {
        self.encrypted() == response
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_known_hash() {
        // SELECT 'md5' || md5(md5('secretalice') || E'\\x01020304')
        let client = Client::new_salt("alice", "secret", &[1, 2, 3, 4]).unwrap();
        let inner = format!("{:x}", md5::compute("secretalice"));
        let mut salted = inner.into_bytes();
        salted.extend_from_slice(&[1, 2, 3, 4]);
        let expected = format!("md5{:x}", md5::compute(salted));

        assert_eq!(client.encrypted(), expected);
        assert_eq!(client.encrypted().len(), 35);
        assert!(client.check(&expected));
    }

    #[test]
    fn test_wrong_password() {
        let server = Client::new("alice", "secret");
        let salt = match server.challenge() {
            Authentication::Md5(salt) => salt,
            _ => panic!("expected md5 challenge"),
        };
        let client = Client::new_salt("alice", "wrong", &salt).unwrap();
        assert!(!server.check(&client.encrypted()));

        let client = Client::new_salt("alice", "secret", &salt).unwrap();
        assert!(server.check(&client.encrypted()));
    }

    #[test]
    fn test_bad_salt() {
        assert!(Client::new_salt("alice", "secret", &[1, 2, 3]).is_err());
    }
}
