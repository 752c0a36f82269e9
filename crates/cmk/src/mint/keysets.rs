use std::collections::{HashMap, HashSet};

use cmk_common::util::unix_time;
use tracing::instrument;

use super::{
    CurrencyUnit, Id, KeySet, KeySetInfo, KeysResponse, KeysetResponse, Mint, MintKeySet,
    MintKeySetInfo,
};
use crate::nuts::nut02::derivation_path_from_unit;
use crate::Error;

impl Mint {
    /// Retrieve the public keys of a keyset for distribution to wallet clients
    #[instrument(skip(self))]
    pub async fn keyset_pubkeys(&self, keyset_id: &Id) -> Result<KeysResponse, Error> {
        let keyset = self.keyset_keys(keyset_id)?;

        Ok(KeysResponse {
            keysets: vec![keyset.into()],
        })
    }

    /// Retrieve the public keys of the active keysets for distribution to wallet
    /// clients
    #[instrument(skip_all)]
    pub async fn pubkeys(&self) -> Result<KeysResponse, Error> {
        let active_keysets: HashSet<Id> = self
            .localstore
            .get_active_keysets()
            .await?
            .into_values()
            .collect();

        let keysets = self.keysets.load();

        Ok(KeysResponse {
            keysets: keysets
                .values()
                .filter(|k| active_keysets.contains(&k.id))
                .map(KeySet::from)
                .collect(),
        })
    }

    /// Return a list of all supported keysets
    #[instrument(skip_all)]
    pub async fn keysets(&self) -> Result<KeysetResponse, Error> {
        let keysets = self.localstore.get_keyset_infos().await?;
        let active_keysets: HashSet<Id> = self
            .localstore
            .get_active_keysets()
            .await?
            .into_values()
            .collect();

        let keysets = keysets
            .into_iter()
            .map(|k| KeySetInfo {
                id: k.id,
                unit: k.unit,
                active: active_keysets.contains(&k.id),
                input_fee_ppk: k.input_fee_ppk,
            })
            .collect();

        Ok(KeysetResponse { keysets })
    }

    /// Get keyset
    #[instrument(skip(self))]
    pub async fn keyset(&self, id: &Id) -> Result<Option<KeySet>, Error> {
        Ok(self.keysets.load().get(id).map(KeySet::from))
    }

    /// Keyset with private keys
    pub(crate) fn keyset_keys(&self, id: &Id) -> Result<MintKeySet, Error> {
        self.keysets
            .load()
            .get(id)
            .cloned()
            .ok_or(Error::UnknownKeySet(*id))
    }

    /// Add current keyset to inactive keysets
    /// Generate new keyset
    ///
    /// The new keyset is derived at `m/0'/{unit}'/{derivation_path_index}'`. Keysets already
    /// loaded keep verifying proofs while the rotation runs.
    #[instrument(skip(self))]
    pub async fn rotate_keyset(
        &self,
        unit: CurrencyUnit,
        derivation_path_index: u32,
        max_order: u8,
        input_fee_ppk: u64,
    ) -> Result<MintKeySetInfo, Error> {
        let _rotation = self.rotation.lock().await;

        self.rotate_keyset_locked(unit, derivation_path_index, max_order, input_fee_ppk)
            .await
    }

    /// Rotate to the keyset after the highest derivation index used for `unit`
    #[instrument(skip(self))]
    pub async fn rotate_next_keyset(
        &self,
        unit: CurrencyUnit,
        max_order: u8,
        input_fee_ppk: u64,
    ) -> Result<MintKeySetInfo, Error> {
        let _rotation = self.rotation.lock().await;

        let next_index = self
            .localstore
            .get_keyset_infos()
            .await?
            .into_iter()
            .filter(|info| info.unit == unit)
            .filter_map(|info| info.derivation_path_index)
            .max()
            .map(|index| index + 1)
            .unwrap_or(0);

        self.rotate_keyset_locked(unit, next_index, max_order, input_fee_ppk)
            .await
    }

    async fn rotate_keyset_locked(
        &self,
        unit: CurrencyUnit,
        derivation_path_index: u32,
        max_order: u8,
        input_fee_ppk: u64,
    ) -> Result<MintKeySetInfo, Error> {
        let derivation_path = derivation_path_from_unit(&unit, derivation_path_index)
            .ok_or(Error::UnsupportedUnit)?;

        let keyset = MintKeySet::generate(&self.seed, &derivation_path, max_order)?;

        let keyset_info = MintKeySetInfo {
            id: keyset.id,
            unit: unit.clone(),
            active: true,
            valid_from: unix_time(),
            derivation_path,
            derivation_path_index: Some(derivation_path_index),
            max_order,
            input_fee_ppk,
        };

        let previous = self.localstore.get_active_keyset_id(&unit).await?;

        self.localstore.add_keyset_info(keyset_info.clone()).await?;

        if let Some(previous) = previous.filter(|id| *id != keyset.id) {
            if let Some(mut previous_info) = self.localstore.get_keyset_info(&previous).await? {
                previous_info.active = false;
                self.localstore.add_keyset_info(previous_info).await?;
            }
        }

        self.localstore.set_active_keyset(unit, keyset.id).await?;

        self.keysets.rcu(|keysets| {
            let mut keysets = HashMap::clone(keysets);
            keysets.insert(keyset.id, keyset.clone());
            keysets
        });

        tracing::debug!(
            "Rotated {} keyset to {} at {}",
            keyset_info.unit,
            keyset_info.id,
            keyset_info.derivation_path
        );

        Ok(keyset_info)
    }
}
