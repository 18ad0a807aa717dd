//! 路由：URL 路径到页面的映射，以及管理后台的导航栏

use anyhow::{bail, Result};

/// 管理后台标签页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminTab {
    Home,
    Active,
    Users,
}

impl AdminTab {
    /// 导航栏顺序
    pub const ALL: [AdminTab; 3] = [AdminTab::Home, AdminTab::Active, AdminTab::Users];

    pub fn path(&self) -> &'static str {
        match self {
            AdminTab::Home => "/admin",
            AdminTab::Active => "/admin/active",
            AdminTab::Users => "/admin/users",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdminTab::Home => "Home",
            AdminTab::Active => "Active Users",
            AdminTab::Users => "All Users",
        }
    }
}

/// 顶层页面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// 入口页，列出两种模式
    Landing,
    User,
    Admin(AdminTab),
}

impl Route {
    /// 解析路径，忽略末尾的 `/` 与查询串
    pub fn from_path(path: &str) -> Result<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let route = match trimmed {
            "" => Route::Landing,
            "/user" => Route::User,
            "/admin" => Route::Admin(AdminTab::Home),
            "/admin/active" => Route::Admin(AdminTab::Active),
            "/admin/users" => Route::Admin(AdminTab::Users),
            _ => bail!("未知路径: {}", path),
        };
        Ok(route)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::User => "/user",
            Route::Admin(tab) => tab.path(),
        }
    }
}

/// 渲染管理后台导航栏，当前标签用 `[]` 标出
pub fn render_admin_nav(current: AdminTab) -> String {
    AdminTab::ALL
        .iter()
        .map(|tab| {
            if *tab == current {
                format!("[{}]", tab.label())
            } else {
                tab.label().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_pages() {
        assert_eq!(Route::from_path("/").unwrap(), Route::Landing);
        assert_eq!(Route::from_path("").unwrap(), Route::Landing);
        assert_eq!(Route::from_path("/user").unwrap(), Route::User);
        assert_eq!(Route::from_path("/user/").unwrap(), Route::User);
        assert_eq!(Route::from_path("/admin").unwrap(), Route::Admin(AdminTab::Home));
        assert_eq!(
            Route::from_path("/admin/active?tab=1").unwrap(),
            Route::Admin(AdminTab::Active)
        );
        assert_eq!(Route::from_path("/admin/users").unwrap(), Route::Admin(AdminTab::Users));
        assert!(Route::from_path("/settings").is_err());
        assert!(Route::from_path("/admin/unknown").is_err());
    }

    #[test]
    fn every_tab_round_trips_through_its_path() {
        for tab in AdminTab::ALL {
            assert_eq!(Route::from_path(tab.path()).unwrap(), Route::Admin(tab));
        }
    }

    #[test]
    fn nav_marks_current_tab() {
        assert_eq!(
            render_admin_nav(AdminTab::Active),
            "Home | [Active Users] | All Users"
        );
    }
}
