//! `redis`-backed [`GeoKvStore`], the default production adapter (§4.1
//! "Expansion: KV trait boundary"). Uses `redis::cmd` directly rather than
//! the crate's typed `AsyncCommands` helpers so the GEOADD/GEOSEARCH
//! argument order is explicit and doesn't depend on a particular
//! `redis`-crate minor version's geo-command surface.

use {
    crate::kv::GeoKvStore,
    async_trait::async_trait,
    redis::{aio::ConnectionManager, AsyncCommands, Client},
    ride_core::CoreError,
    std::time::Duration,
};

#[derive(Clone)]
pub struct RedisGeoStore {
    manager: ConnectionManager,
}

impl RedisGeoStore {
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let client = Client::open(url).map_err(CoreError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(CoreError::from)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl GeoKvStore for RedisGeoStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(CoreError::from)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(CoreError::from)
    }

    async fn del(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await.map_err(CoreError::from)
    }

    async fn geo_add(&self, key: &str, member: &str, lat: f64, lng: f64) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("GEOADD")
            .arg(key)
            .arg(lng)
            .arg(lat)
            .arg(member)
            .query_async::<()>(&mut conn)
            .await
            .map_err(CoreError::from)
    }

    async fn geo_rem(&self, key: &str, member: &str) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        conn.zrem::<_, _, ()>(key, member)
            .await
            .map_err(CoreError::from)
    }

    async fn geo_search(
        &self,
        key: &str,
        lat: f64,
        lng: f64,
        radius_km: f64,
        count: usize,
    ) -> Result<Vec<(String, f64)>, CoreError> {
        let mut conn = self.manager.clone();
        let rows: Vec<(String, String)> = redis::cmd("GEOSEARCH")
            .arg(key)
            .arg("FROMLONLAT")
            .arg(lng)
            .arg(lat)
            .arg("BYRADIUS")
            .arg(radius_km)
            .arg("km")
            .arg("ASC")
            .arg("COUNT")
            .arg(count)
            .arg("WITHDIST")
            .query_async(&mut conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .filter_map(|(member, distance)| distance.parse::<f64>().ok().map(|d| (member, d)))
            .collect())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(CoreError::from)
    }

    async fn set_rem(&self, key: &str, member: &str) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(CoreError::from)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CoreError> {
        let mut conn = self.manager.clone();
        conn.smembers(key).await.map_err(CoreError::from)
    }
}
