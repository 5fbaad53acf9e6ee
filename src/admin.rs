//! Role hierarchy and admin/mod operations shared by every scope that carries
//! `admins`/`mods` lists (§4.9): MainLobby, game lobbies, rooms, games.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    User,
    Mod,
    Admin,
}

#[derive(Debug)]
pub enum AdminError {
    NotAdmin,
    NotModOrAdmin,
}

/// Role/kick bookkeeping over a scope's `admins`/`mods`/`kicked_players` lists.
///
/// Checks are uid-based. Role lists may name uids of sessions that are not
/// currently connected to this scope; that is not an error here, only at the
/// point an operation tries to act on "a currently connected session".
pub struct AdminControl;

impl AdminControl {
    #[must_use]
    pub fn role_of(admins: &[String], mods: &[String], uid: &str) -> Role {
        if admins.iter().any(|a| a == uid) {
            Role::Admin
        } else if mods.iter().any(|m| m == uid) {
            Role::Mod
        } else {
            Role::User
        }
    }

    pub fn require_admin(admins: &[String], uid: &str) -> Result<(), AdminError> {
        if admins.iter().any(|a| a == uid) {
            Ok(())
        } else {
            Err(AdminError::NotAdmin)
        }
    }

    pub fn require_mod_or_admin(
        admins: &[String],
        mods: &[String],
        uid: &str,
    ) -> Result<(), AdminError> {
        if admins.iter().any(|a| a == uid) || mods.iter().any(|m| m == uid) {
            Ok(())
        } else {
            Err(AdminError::NotModOrAdmin)
        }
    }

    /// `ADD_ADMIN {uid}` — admin-only.
    pub fn add_admin(admins: &mut Vec<String>, actor: &str, target: String) -> Result<(), AdminError> {
        Self::require_admin(admins, actor)?;
        if !admins.contains(&target) {
            admins.push(target);
        }
        Ok(())
    }

    /// `RM_ADMIN {uid}` — admin-only.
    pub fn remove_admin(admins: &mut Vec<String>, actor: &str, target: &str) -> Result<(), AdminError> {
        Self::require_admin(admins, actor)?;
        admins.retain(|a| a != target);
        Ok(())
    }

    /// `ADD_MOD {uid}` — admin-only.
    pub fn add_mod(
        admins: &[String],
        mods: &mut Vec<String>,
        actor: &str,
        target: String,
    ) -> Result<(), AdminError> {
        Self::require_admin(admins, actor)?;
        if !mods.contains(&target) {
            mods.push(target);
        }
        Ok(())
    }

    /// `RM_MOD {uid}` — admin-only.
    pub fn remove_mod(
        admins: &[String],
        mods: &mut Vec<String>,
        actor: &str,
        target: &str,
    ) -> Result<(), AdminError> {
        Self::require_admin(admins, actor)?;
        mods.retain(|m| m != target);
        Ok(())
    }

    /// `KICK_PLAYER {uid}` — mod-or-admin. Records the target so a later
    /// rejoin attempt is rejected and the connected session is dropped at the
    /// next read-loop boundary.
    pub fn kick_player(
        admins: &[String],
        mods: &[String],
        kicked_players: &mut Vec<String>,
        actor: &str,
        target: String,
    ) -> Result<(), AdminError> {
        Self::require_mod_or_admin(admins, mods, actor)?;
        if !kicked_players.contains(&target) {
            kicked_players.push(target);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_resolves_admin_over_mod() {
        let admins = vec!["u1".to_string()];
        let mods = vec!["u1".to_string(), "u2".to_string()];
        assert_eq!(AdminControl::role_of(&admins, &mods, "u1"), Role::Admin);
        assert_eq!(AdminControl::role_of(&admins, &mods, "u2"), Role::Mod);
        assert_eq!(AdminControl::role_of(&admins, &mods, "u3"), Role::User);
    }

    #[test]
    fn add_admin_requires_existing_admin() {
        let mut admins = vec!["u1".to_string()];
        assert!(AdminControl::add_admin(&mut admins, "u2", "u3".to_string()).is_err());
        assert!(AdminControl::add_admin(&mut admins, "u1", "u3".to_string()).is_ok());
        assert!(admins.contains(&"u3".to_string()));
    }

    #[test]
    fn kick_player_allows_mod() {
        let admins = vec!["u1".to_string()];
        let mods = vec!["u2".to_string()];
        let mut kicked = Vec::new();
        assert!(AdminControl::kick_player(&admins, &mods, &mut kicked, "u2", "u3".to_string()).is_ok());
        assert_eq!(kicked, vec!["u3".to_string()]);
    }

    #[test]
    fn kick_player_rejects_plain_user() {
        let admins = vec!["u1".to_string()];
        let mods = vec!["u2".to_string()];
        let mut kicked = Vec::new();
        let result = AdminControl::kick_player(&admins, &mods, &mut kicked, "u4", "u3".to_string());
        assert!(matches!(result, Err(AdminError::NotModOrAdmin)));
    }

    #[test]
    fn remove_admin_is_idempotent_for_absent_target() {
        let mut admins = vec!["u1".to_string()];
        assert!(AdminControl::remove_admin(&mut admins, "u1", "not-present").is_ok());
        assert_eq!(admins, vec!["u1".to_string()]);
    }
}
