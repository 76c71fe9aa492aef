use serenity::all::Permissions;

/// Capabilities whose possession lets a compromised account wreck a guild.
/// Roles granting any of these are stripped by `PunishmentKind::StripDangerousRoles`.
pub const DANGEROUS_PERMISSIONS: Permissions = Permissions::ADMINISTRATOR
    .union(Permissions::MANAGE_GUILD)
    .union(Permissions::MANAGE_ROLES)
    .union(Permissions::MANAGE_CHANNELS)
    .union(Permissions::BAN_MEMBERS)
    .union(Permissions::KICK_MEMBERS)
    .union(Permissions::MANAGE_MESSAGES);

/// Bits denied to `@everyone` on every text channel during a lockdown.
pub const LOCKDOWN_DENY: Permissions = Permissions::SEND_MESSAGES
    .union(Permissions::ADD_REACTIONS)
    .union(Permissions::CREATE_PUBLIC_THREADS)
    .union(Permissions::CREATE_PRIVATE_THREADS);

pub fn is_dangerous(permissions: Permissions) -> bool {
    permissions.intersects(DANGEROUS_PERMISSIONS)
}

/// Administrator implies every other permission.
pub fn has_authority(granted: Permissions, required: Permissions) -> bool {
    granted.contains(Permissions::ADMINISTRATOR) || granted.contains(required)
}

/// Merge the lockdown denies into an existing `@everyone` overwrite.
/// Denies the overwrite already carried (e.g. VIEW_CHANNEL on private channels) stay.
pub fn lockdown_overwrite(allow: Permissions, deny: Permissions) -> (Permissions, Permissions) {
    (allow.difference(LOCKDOWN_DENY), deny.union(LOCKDOWN_DENY))
}
