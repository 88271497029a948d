//! `UpdateProfile`: apply a partial profile update gated by
//! `UpdateProfileFlags`. An uninitialized row requires `SetVersion &&
//! SetName && SetLocation` together; an already-initialized row accepts any
//! non-empty subset. Field limits come from the context
//! (`max_profile_name_length_bytes`, `max_profile_image_length_bytes`,
//! `max_extra_data_length_bytes`); an image, if present, is validated,
//! persisted, and thumbnailed before the row is swapped, and the images it
//! replaces are deleted afterward.

use async_trait::async_trait;
use codec::message::{ConversationRequest, RequestBody, ResponseMessage, Role, Status, UpdateProfileRequest};

use crate::handler::{Handler, HandlerContext, RequiredStatus};
use crate::repository::ProfileUpdate;
use crate::session::ConversationStatus;

pub struct UpdateProfile;

#[async_trait]
impl Handler for UpdateProfile {
    fn required_role(&self) -> Role {
        Role::CLIENT_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::Authenticated)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let request = match body {
            RequestBody::Conversation(ConversationRequest::UpdateProfile(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        let UpdateProfileRequest {
            flags,
            version,
            name,
            location,
            image,
            extra_data,
        } = request;

        let Some(identity_id) = ctx.session.identity_id() else {
            return ResponseMessage::error(request_id, Status::ErrorUninitialized);
        };

        let hosting = match ctx.repository.lookup_hosting(&identity_id).await {
            Ok(Some(row)) => row,
            Ok(None) => return ResponseMessage::error(request_id, Status::ErrorNotFound),
            Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
        };

        let flags_valid = if hosting.profile_initialized {
            flags.any()
        } else {
            flags.is_initialization()
        };
        if !flags_valid {
            return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "flags");
        }

        if flags.set_version && version.is_none() {
            return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "version");
        }

        if flags.set_name {
            if name.as_deref().map(str::len).unwrap_or(0) > ctx.max_profile_name_length_bytes {
                return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "name");
            }
        }
        if flags.set_extra_data {
            if extra_data.as_deref().map(str::len).unwrap_or(0) > ctx.max_extra_data_length_bytes {
                return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "extra_data");
            }
        }
        if flags.set_image {
            if image.as_deref().map(<[u8]>::len).unwrap_or(0) > ctx.max_profile_image_length_bytes {
                return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "image");
            }
        }

        let mut update = ProfileUpdate {
            version: flags.set_version.then_some(version).flatten().map(|v| (v.major, v.minor, v.patch)),
            name: flags.set_name.then_some(name).flatten(),
            extra_data: flags.set_extra_data.then_some(extra_data).flatten(),
            location: flags.set_location.then_some(location).flatten().map(|(lat, lon)| {
                let mut bytes = [0u8; 4];
                bytes[..2].copy_from_slice(&(lat as i16).to_be_bytes());
                bytes[2..].copy_from_slice(&(lon as i16).to_be_bytes());
                bytes
            }),
            ..ProfileUpdate::default()
        };

        if flags.set_image {
            let Some(image_bytes) = image else {
                return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "image");
            };

            if ctx.image_store.validate_image_format(&image_bytes).is_err() {
                return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "image_format");
            }

            let saved = match ctx.image_store.save_image(&identity_id, &image_bytes).await {
                Ok(id) => id,
                Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
            };
            let thumbnail = match ctx.image_store.generate_thumbnail(&saved).await {
                Ok(id) => id,
                Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
            };

            update.image_id = Some(saved);
            update.thumbnail_id = Some(thumbnail);
        }

        let mut guard = match ctx.repository.lock_hosting_table().await {
            Ok(guard) => guard,
            Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
        };

        if guard.update_profile(identity_id, update).await.is_err() {
            guard.rollback();
            return ResponseMessage::error(request_id, Status::ErrorInternal);
        }

        if guard.commit().await.is_err() {
            return ResponseMessage::error(request_id, Status::ErrorInternal);
        }

        if flags.set_image {
            // Best-effort: a crash between the commit above and this delete can
            // leak files, same tradeoff as the cancel-agreement handlers.
            if let Some(old_image) = hosting.profile_image_id {
                let _ = ctx.image_store.delete_image(&old_image).await;
            }
            if let Some(old_thumbnail) = hosting.thumbnail_image_id {
                let _ = ctx.image_store.delete_image(&old_thumbnail).await;
            }
        }

        ResponseMessage {
            id: request_id,
            status: Status::Ok,
            details: None,
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler as _;
    use crate::handlers::test_support::test_ctx;
    use codec::message::{UpdateProfileFlags, Version};

    fn body(
        flags: UpdateProfileFlags,
        version: Option<Version>,
        name: Option<String>,
        location: Option<(i32, i32)>,
        image: Option<Vec<u8>>,
    ) -> RequestBody {
        RequestBody::Conversation(ConversationRequest::UpdateProfile(UpdateProfileRequest {
            flags,
            version,
            name,
            location,
            image,
            extra_data: None,
        }))
    }

    const INIT_FLAGS: UpdateProfileFlags = UpdateProfileFlags {
        set_version: true,
        set_name: true,
        set_location: true,
        set_image: false,
        set_extra_data: false,
    };

    async fn initialize(ctx: &HandlerContext) {
        let response = UpdateProfile
            .handle(
                ctx,
                1,
                body(INIT_FLAGS, Some(Version::CURRENT), Some("alice".into()), Some((1, 2)), None),
            )
            .await;
        assert_eq!(response.status, Status::Ok);
    }

    #[tokio::test]
    async fn rejects_a_partial_flag_set_on_an_uninitialized_profile() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [5; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([5; 32], vec![1; 32])
            .await
            .unwrap();

        let flags = UpdateProfileFlags { set_name: true, ..Default::default() };
        let response = UpdateProfile
            .handle(&ctx, 1, body(flags, None, Some("alice".into()), None, None))
            .await;
        assert_eq!(response.status, Status::ErrorInvalidValue);
        assert_eq!(response.details.as_deref(), Some("flags"));

        let row = ctx.repository.lookup_hosting(&[5; 32]).await.unwrap().unwrap();
        assert!(!row.profile_initialized);
    }

    #[tokio::test]
    async fn rejects_an_initializing_request_with_no_version_value() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [6; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([6; 32], vec![1; 32])
            .await
            .unwrap();

        let response = UpdateProfile
            .handle(&ctx, 1, body(INIT_FLAGS, None, Some("alice".into()), Some((1, 2)), None))
            .await;
        assert_eq!(response.status, Status::ErrorInvalidValue);
        assert_eq!(response.details.as_deref(), Some("version"));
    }

    #[tokio::test]
    async fn initializes_a_profile_with_all_three_required_flags() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [7; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([7; 32], vec![1; 32])
            .await
            .unwrap();

        initialize(&ctx).await;

        let row = ctx.repository.lookup_hosting(&[7; 32]).await.unwrap().unwrap();
        assert!(row.profile_initialized);
        assert_eq!(row.version, Some((1, 0, 0)));
        assert_eq!(row.name, "alice");
    }

    #[tokio::test]
    async fn updates_name_only_once_initialized() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [8; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([8; 32], vec![1; 32])
            .await
            .unwrap();
        initialize(&ctx).await;

        let flags = UpdateProfileFlags { set_name: true, ..Default::default() };
        let response = UpdateProfile
            .handle(&ctx, 2, body(flags, None, Some("bob".into()), None, None))
            .await;
        assert_eq!(response.status, Status::Ok);

        let row = ctx.repository.lookup_hosting(&[8; 32]).await.unwrap().unwrap();
        assert_eq!(row.name, "bob");
    }

    #[tokio::test]
    async fn rejects_name_over_the_configured_limit() {
        let mut ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [9; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([9; 32], vec![1; 32])
            .await
            .unwrap();
        initialize(&ctx).await;
        ctx.max_profile_name_length_bytes = 2;

        let flags = UpdateProfileFlags { set_name: true, ..Default::default() };
        let response = UpdateProfile
            .handle(&ctx, 2, body(flags, None, Some("alice".into()), None, None))
            .await;
        assert_eq!(response.status, Status::ErrorInvalidValue);
        assert_eq!(response.details.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn rejects_an_image_with_no_recognizable_format() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [10; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([10; 32], vec![1; 32])
            .await
            .unwrap();
        initialize(&ctx).await;

        let flags = UpdateProfileFlags { set_image: true, ..Default::default() };
        let response = UpdateProfile
            .handle(&ctx, 2, body(flags, None, None, None, Some(vec![0, 1, 2])))
            .await;
        assert_eq!(response.status, Status::ErrorInvalidValue);
    }

    #[tokio::test]
    async fn deletes_the_superseded_image_and_thumbnail_on_swap() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [11; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([11; 32], vec![1; 32])
            .await
            .unwrap();
        initialize(&ctx).await;

        let png = [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];
        let flags = UpdateProfileFlags { set_image: true, ..Default::default() };
        let response = UpdateProfile
            .handle(&ctx, 2, body(flags, None, None, None, Some(png.to_vec())))
            .await;
        assert_eq!(response.status, Status::Ok);

        let row = ctx.repository.lookup_hosting(&[11; 32]).await.unwrap().unwrap();
        let first_image = row.profile_image_id.clone().unwrap();
        let first_thumbnail = row.thumbnail_image_id.clone().unwrap();

        let png2 = [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 9, 9, 9];
        let response = UpdateProfile
            .handle(&ctx, 3, body(flags, None, None, None, Some(png2.to_vec())))
            .await;
        assert_eq!(response.status, Status::Ok);

        assert!(ctx.image_store.load_image(&first_image).await.is_err());
        assert!(ctx.image_store.load_image(&first_thumbnail).await.is_err());

        let row = ctx.repository.lookup_hosting(&[11; 32]).await.unwrap().unwrap();
        assert_ne!(row.profile_image_id.unwrap(), first_image);
    }
}
