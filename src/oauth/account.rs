//! Create or refresh the local principal behind a provider identity.

use tracing::info;

use super::provider::NormalizedProfile;
use crate::auth::AuthError;
use crate::db::{Database, Principal, Provider, is_unique_violation};

/// Find the principal for `(provider, subject)` or create it.
///
/// An existing principal only ever has its display name refreshed. A new
/// one is refused when its email already belongs to another principal.
pub async fn provision_principal(
    db: &Database,
    provider: Provider,
    profile: &NormalizedProfile,
) -> Result<Principal, AuthError> {
    let principals = db.principals();

    if let Some(mut existing) = principals
        .get_by_provider(provider, &profile.provider_subject_id)
        .await?
    {
        if let Some(name) = &profile.display_name {
            if principals.update_display_name(existing.id, name).await? {
                info!(principal_id = existing.id, "Display name updated from provider");
                existing.display_name = name.clone();
            }
        }
        return Ok(existing);
    }

    if principals.get_by_email(&profile.email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let display_name = profile.display_name_or_default();
    let id = match principals
        .create_external(
            provider,
            &profile.provider_subject_id,
            &profile.email,
            &display_name,
        )
        .await
    {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            // A concurrent callback for the same identity won the insert
            return principals
                .get_by_provider(provider, &profile.provider_subject_id)
                .await?
                .ok_or(AuthError::EmailTaken);
        }
        Err(e) => return Err(e.into()),
    };

    info!(principal_id = id, provider = provider.as_str(), "Provisioned principal");

    principals
        .get_by_id(id)
        .await?
        .ok_or(AuthError::PrincipalNotFound(id))
}
